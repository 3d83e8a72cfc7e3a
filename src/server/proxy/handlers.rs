use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use reqwest::Url;
use std::net::SocketAddr;

use super::{downstream_response_headers, has_body, upstream_request_headers};
use crate::server::auth::{directory::authenticate_grants, gate, middleware::extract_basic_credentials};
use crate::server::error::ServerError;
use crate::server::state::AppState;

const BASIC_CHALLENGE: &str = "Basic realm=\"Registry\"";

fn challenge(message: &str) -> Response {
    (
        [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
        ServerError::unauthorized(message),
    )
        .into_response()
}

/// Authenticate, authorize and forward one registry protocol request
pub async fn proxy(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let Some(creds) = extract_basic_credentials(req.headers()).filter(|c| !c.password.is_empty())
    else {
        tracing::debug!(method = %method, path = %path, "Registry request without credentials");
        return challenge("auth required");
    };

    let primary = match authenticate_grants(
        state.directory.as_ref(),
        &state.group_name_prefix,
        &creds.username,
        &creds.password,
    )
    .await
    {
        Ok((_, primary)) => primary,
        Err(e) if e.is_unavailable() => {
            tracing::error!(username = %creds.username, error = %e, "Directory unavailable");
            return challenge("invalid credentials");
        }
        Err(e) => {
            tracing::warn!(username = %creds.username, error = %e, "Registry authentication failed");
            return challenge("invalid credentials");
        }
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = match state.proxy.target_url(path_and_query) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(username = %primary.name, path = %path, error = %e, "Unroutable registry path");
            return ServerError::bad_request("invalid path").into_response();
        }
    };

    // The URL parser rewrites `\` and dot segments, so the path actually
    // sent upstream is authorized as well as the one received
    let decision = gate::authorize(&primary, &method, &path).and_then(|()| {
        match state.proxy.upstream_path(&target) {
            Some(upstream_path) if upstream_path == "/v2" || upstream_path.starts_with("/v2/") => {
                gate::authorize(&primary, &method, upstream_path)
            }
            _ => Err(gate::Denial::WrongNamespace),
        }
    });
    if let Err(denial) = decision {
        tracing::warn!(
            username = %primary.name,
            namespace = %primary.namespace,
            method = %method,
            path = %path,
            upstream_path = %target.path(),
            reason = %denial,
            "Registry request denied"
        );
        return ServerError::forbidden("forbidden").into_response();
    }

    match forward(&state, target, req).await {
        Ok(response) => {
            tracing::debug!(
                username = %primary.name,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                "Registry request forwarded"
            );
            response
        }
        Err(e) => e.with_context("path", path).into_response(),
    }
}

async fn forward(state: &AppState, target: Url, req: Request) -> Result<Response, ServerError> {
    let (parts, body) = req.into_parts();

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let headers = upstream_request_headers(&parts.headers, client_ip, &state.proxy.forwarded_proto);

    let mut request = state
        .proxy
        .client
        .request(parts.method.clone(), target)
        .headers(headers);
    if has_body(&body) {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| ServerError::bad_gateway(e.into(), "registry unavailable"))?;

    let status = upstream.status();
    let headers = downstream_response_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
