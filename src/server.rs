use crate::functions::chat::{ChatHandler, FunctionEvent, FunctionResponse};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const CHAT_PATH: &str = "/chat";
/// Path the site's widget calls when deployed behind the function gateway.
pub const FUNCTION_PATH: &str = "/.netlify/functions/chat";

/// Largest request body the chat function reads.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Router exposing the chat function on both its plain and gateway paths.
/// Method filtering is left to the handler so it can answer 405 itself.
pub fn router(handler: Arc<ChatHandler>) -> Router {
    Router::new()
        .route(CHAT_PATH, any(chat_function))
        .route(FUNCTION_PATH, any(chat_function))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn chat_function(
    State(handler): State<Arc<ChatHandler>>,
    method: Method,
    body: Body,
) -> Response {
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(rejection) if method == Method::POST => return into_http(rejection),
        // The handler answers OPTIONS and 405 without looking at the body.
        Err(_) => None,
    };
    let event = FunctionEvent::new(method.as_str(), body);
    into_http(handler.handle(event).await)
}

/// Reads the body as UTF-8 text, answering failures in the handler's envelope.
async fn read_body(body: Body) -> Result<Option<String>, FunctionResponse> {
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::debug!(limit = MAX_BODY_BYTES, "rejecting oversized chat body");
            return Err(FunctionResponse::failure(413, "Request body too large", None));
        }
        Err(e) => {
            return Err(FunctionResponse::failure(
                400,
                "Invalid request body",
                Some(e.to_string()),
            ));
        }
    };

    if bytes.is_empty() {
        return Ok(None);
    }

    String::from_utf8(bytes.to_vec()).map(Some).map_err(|e| {
        tracing::debug!(error = %e, "rejecting non UTF-8 chat body");
        FunctionResponse::failure(400, "Invalid request body", Some(e.to_string()))
    })
}

fn into_http(resp: FunctionResponse) -> Response {
    let status =
        StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    for (name, value) in resp.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            headers.insert(name, value);
        }
    }

    (status, headers, resp.body).into_response()
}
