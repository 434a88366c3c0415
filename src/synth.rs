use std::sync::Arc;

use crate::error::Result;
use crate::model::Record;
use crate::provider::TextGenerator;

/// Turns a query (and optionally retrieved records) into the final answer.
pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
    max_output_tokens: u32,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, max_output_tokens: u32) -> Self {
        Self { generator, max_output_tokens }
    }

    /// The query goes to the generator verbatim, no context attached.
    pub async fn generate_direct(&self, query_text: &str) -> Result<String> {
        self.generator.generate(query_text, self.max_output_tokens).await
    }

    /// One generation call over the query and `records` in retrieval order.
    /// Callers must not pass an empty slice; the orchestrator answers that
    /// case without generating.
    pub async fn generate_grounded(&self, query_text: &str, records: &[Record]) -> Result<String> {
        let prompt = grounded_prompt(query_text, records);
        self.generator.generate(&prompt, self.max_output_tokens).await
    }
}

pub fn context_block(records: &[Record]) -> String {
    records
    .iter()
    .map(|r| format!("Title: {}\nDescription: {}", r.title, r.description))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn grounded_prompt(query_text: &str, records: &[Record]) -> String {
    format!(
        "Based on the following information and the user's query: '{}', the retrieved response is \n\n{} . Please structure the answer",
        query_text,
        context_block(records)
    )
}
