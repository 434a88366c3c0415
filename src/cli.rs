use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;

use hindsight::parser::{self, Command};
use hindsight::server::{ErrorBody, QueryRequest};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Interactive client for a Hindsight node", long_about = None)]
struct Args {
    #[clap(long, default_value = "http://127.0.0.1:8000")]
    server: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let endpoint = format!("{}/api/query", args.server.trim_end_matches('/'));
    let http = reqwest::Client::new();

    print_banner(&args.server);
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("hindsight> ");
        io::stdout().flush()?;
        buffer.clear();

        if stdin.read_line(&mut buffer)? == 0 { break; }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Help) => print_help(),
            Ok(Command::Exit) => break,
            Ok(Command::Rag { query, k }) => {
                let req = QueryRequest { query, mode: "rag".into(), k: Some(k) };
                report(send(&http, &endpoint, &req).await);
            }
            Ok(Command::Ask { query }) => {
                let req = QueryRequest { query, mode: "generate".into(), k: None };
                report(send(&http, &endpoint, &req).await);
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if !buffer.contains('"') {
                    println!("    \u{2139}\u{fe0f}  Hint: Quote the question: RAG \"my bank account\" LIMIT 3");
                }
            }
        }
    }
    Ok(())
}

fn print_banner(server: &str) {
    println!("\n==================================================");
    println!("   Hindsight CLI - Ask Your Browsing History");
    println!("   Node: {}", server);
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. RAG:   RAG \"question\" [LIMIT k]   answer from your history");
    println!("2. ASK:   ASK \"question\"             answer without your history");
    println!("3. EXIT:  Quit\n");
}

async fn send(http: &reqwest::Client, endpoint: &str, req: &QueryRequest) -> anyhow::Result<String> {
    let resp = http
    .post(endpoint)
    .json(req)
    .send()
    .await
    .with_context(|| format!("could not reach {}", endpoint))?;

    if resp.status().is_success() {
        Ok(resp.json::<String>().await.context("malformed answer")?)
    } else {
        let status = resp.status();
        let detail = resp
        .json::<ErrorBody>()
        .await
        .map(|b| b.detail)
        .unwrap_or_else(|_| status.to_string());
        anyhow::bail!("{}", detail)
    }
}

fn report(result: anyhow::Result<String>) {
    match result {
        Ok(answer) => println!("\n{}\n", answer),
        Err(e) => println!("[\u{26a0}\u{fe0f} Error] {:#}", e),
    }
}
