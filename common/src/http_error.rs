//! Shared HTTP error-body rendering (spec §7 "User-visible failure":
//! every HTTP error response carries a status code, a one-line message,
//! and for internal calls, the node id that produced it).

use hyper::{Body, Response};
use serde::Serialize;

use crate::error::ClusterError;
use crate::headers;

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: String,
    node_id: &'a str,
}

pub fn error_response(node_id: &str, err: &ClusterError) -> Response<Body> {
    let status = err.status_code();
    let body = ErrorBody {
        status,
        message: err.to_string(),
        node_id,
    };
    let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .header(headers::NODE_ID, node_id)
        .body(Body::from(bytes))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
