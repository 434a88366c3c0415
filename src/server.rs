use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::Hindsight;

/// Body of `POST /api/query`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

/// Error body, `{"detail": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub detail: String,
}

pub struct HindsightServer {
    engine: Arc<Hindsight>,
    allowed_origin: String,
}

impl HindsightServer {
    pub fn new(engine: Arc<Hindsight>, allowed_origin: impl Into<String>) -> Self {
        Self { engine, allowed_origin: allowed_origin.into() }
    }

    pub async fn run(&self, addr: SocketAddr) {
        info!("Hindsight query API listening on {}", addr);
        warp::serve(routes(self.engine.clone(), &self.allowed_origin)).run(addr).await;
    }
}

pub fn routes(
    engine: Arc<Hindsight>,
    allowed_origin: &str,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let cors = warp::cors()
    .allow_origin(allowed_origin)
    .allow_credentials(true)
    .allow_methods(vec!["GET", "POST", "OPTIONS"])
    .allow_headers(vec!["content-type"]);

    warp::post()
    .and(warp::path!("api" / "query"))
    .and(warp::body::json())
    .and(with_engine(engine))
    .and_then(handle_query)
    .with(cors)
}

fn with_engine(engine: Arc<Hindsight>) -> impl Filter<Extract = (Arc<Hindsight>,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

async fn handle_query(req: QueryRequest, engine: Arc<Hindsight>) -> Result<Response, warp::Rejection> {
    let span = info_span!("query", id = %Uuid::new_v4(), mode = %req.mode);

    async move {
        info!("Received query ({} chars)", req.query.len());
        match engine.submit_query(&req.query, &req.mode, req.k).await {
            Ok(answer) => Ok(warp::reply::json(&answer).into_response()),
            Err(e) => {
                error!("Query failed: {}", e);
                let body = warp::reply::json(&ErrorBody { detail: e.to_string() });
                Ok(warp::reply::with_status(body, StatusCode::INTERNAL_SERVER_ERROR).into_response())
            }
        }
    }
    .instrument(span)
    .await
}
