use serde::Serialize;
use warp::http::{Response, StatusCode};

/// Bodies for successes that are not just a record echoed back.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Deleted {
        status: u16,
        message: String,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
}

/// Assembles a JSON response, forwarding any upstream session cookies.
pub(crate) fn json_reply(
    status: StatusCode,
    cookies: &[String],
    body: Vec<u8>,
) -> Response<Vec<u8>> {
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", "application/json");

    for cookie in cookies {
        builder = builder.header("set-cookie", cookie);
    }

    // Static header names and already-validated values; assembly cannot fail.
    builder.body(body).expect("assemble response")
}
