//! Channel webhooks over HTTP
//!
//! One hyper HTTP/1 server carries the USSD gateway callback, the WhatsApp
//! webhook, the Twilio IVR callback, plus `/health` and `/metrics`.

use crate::domain::types::{Channel, SessionInput};
use crate::infra::metrics::Metrics;
use crate::io::prometheus::format_prometheus_metrics;
use crate::io::twiml::TwimlRenderer;
use crate::services::parking::ParkingService;
use crate::services::replies::{self, IvrReply, UssdReply};
use bytes::Bytes;
use chrono::NaiveDateTime;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Query keys that carry the USSD string, in lookup order
const USSD_TEXT_KEYS: [&str; 4] = ["INPUT", "TEXT", "text", "input"];
/// Form keys that carry the USSD string when the query has none
const USSD_FORM_KEYS: [&str; 3] = ["text", "INPUT", "input"];
const PHONE_KEYS: [&str; 3] = ["MSISDN", "msisdn", "From"];

const RECEIVED: &str = r#"{"status":"received"}"#;

/// Shared state for request handlers
pub struct AppState {
    pub service: Arc<ParkingService>,
    pub twiml: TwimlRenderer,
    pub service_name: String,
    pub max_body_bytes: usize,
}

impl AppState {
    fn metrics(&self) -> &Arc<Metrics> {
        self.service.metrics()
    }
}

#[derive(Debug, Deserialize)]
struct WhatsAppWebhook {
    #[serde(default)]
    results: Vec<WebhookResult>,
}

#[derive(Debug, Deserialize)]
struct WebhookResult {
    #[serde(default)]
    from: String,
    #[serde(default)]
    message: WebhookMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookMessage {
    #[serde(default)]
    text: String,
}

type Params = HashMap<String, String>;

fn parse_params(raw: &str) -> Params {
    serde_urlencoded::from_str(raw).unwrap_or_else(|e| {
        debug!(error = %e, "urlencoded_parse_failed");
        Params::new()
    })
}

/// First non-empty value among `keys`
fn first_value<'a>(params: &'a Params, keys: &[&str]) -> Option<&'a str> {
    keys.iter().filter_map(|k| params.get(*k)).map(|v| v.trim()).find(|v| !v.is_empty())
}

fn response(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

async fn read_body(req: Request<hyper::body::Incoming>, limit: usize) -> Option<Bytes> {
    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            warn!(error = %e, limit = %limit, "request_body_rejected");
            None
        }
    }
}

/// Channel-formatted reply for a request whose body could not be read
fn rejected_body_reply(channel: Channel, state: &AppState) -> Response<Full<Bytes>> {
    state.metrics().record_request(channel);
    state.metrics().record_invalid_input();
    match channel {
        Channel::Ussd => {
            let reply = UssdReply::End(replies::TRY_AGAIN.to_string());
            response(StatusCode::OK, "text/plain; charset=utf-8", reply.to_string())
        }
        Channel::Ivr => {
            let reply = IvrReply::Hangup(replies::TRY_AGAIN.to_string());
            response(StatusCode::OK, "application/xml", state.twiml.render(&reply))
        }
        Channel::WhatsApp => response(StatusCode::OK, "application/json", RECEIVED),
    }
}

/// Build the USSD session input from query parameters, then the form body
fn ussd_input(query: &Params, body: &[u8]) -> SessionInput {
    let form = if first_value(query, &USSD_TEXT_KEYS).is_none() || first_value(query, &PHONE_KEYS).is_none() {
        parse_params(&String::from_utf8_lossy(body))
    } else {
        Params::new()
    };
    let text = first_value(query, &USSD_TEXT_KEYS)
        .or_else(|| first_value(&form, &USSD_FORM_KEYS))
        .unwrap_or_default();
    let phone = first_value(query, &PHONE_KEYS)
        .or_else(|| first_value(&form, &PHONE_KEYS))
        .unwrap_or_default();
    SessionInput::new(Channel::Ussd, text, phone)
}

/// Twilio sends `From` and `Digits` as a form on POST and as a query on GET
fn ivr_input(query: &Params, body: &[u8]) -> SessionInput {
    let mut params = parse_params(&String::from_utf8_lossy(body));
    for (key, value) in query {
        params.entry(key.clone()).or_insert_with(|| value.clone());
    }
    let digits = first_value(&params, &["Digits"]).unwrap_or_default();
    let phone = first_value(&params, &["From"]).unwrap_or_default();
    SessionInput::new(Channel::Ivr, digits, phone)
}

fn whatsapp_inputs(body: &[u8]) -> Vec<SessionInput> {
    match serde_json::from_slice::<WhatsAppWebhook>(body) {
        Ok(webhook) => webhook
            .results
            .into_iter()
            .map(|r| SessionInput::new(Channel::WhatsApp, r.message.text.trim(), &r.from))
            .collect(),
        Err(e) => {
            warn!(error = %e, "whatsapp_webhook_malformed");
            Vec::new()
        }
    }
}

async fn handle_channel(
    req: Request<hyper::body::Incoming>,
    channel: Channel,
    state: Arc<AppState>,
    now: NaiveDateTime,
) -> Response<Full<Bytes>> {
    let start = Instant::now();
    let query = parse_params(req.uri().query().unwrap_or_default());
    let Some(body) = read_body(req, state.max_body_bytes).await else {
        return rejected_body_reply(channel, &state);
    };

    let reply = match channel {
        Channel::Ussd => {
            let input = ussd_input(&query, &body);
            let reply = state.service.handle_ussd(&input, now).await;
            info!(phone = %input.phone, text = %input.raw_text, reply = %reply, "ussd_reply");
            response(StatusCode::OK, "text/plain; charset=utf-8", reply.to_string())
        }
        Channel::Ivr => {
            let input = ivr_input(&query, &body);
            let reply = state.service.handle_ivr(&input, now).await;
            info!(phone = %input.phone, digits = %input.raw_text, "ivr_reply");
            response(StatusCode::OK, "application/xml", state.twiml.render(&reply))
        }
        Channel::WhatsApp => {
            let inputs = whatsapp_inputs(&body);
            info!(messages = %inputs.len(), "whatsapp_webhook_received");
            let service = state.service.clone();
            tokio::spawn(
                async move {
                    for input in &inputs {
                        service.handle_whatsapp(input, now).await;
                    }
                }
                .in_current_span(),
            );
            response(StatusCode::OK, "application/json", RECEIVED)
        }
    };

    state.metrics().record_latency(start.elapsed().as_millis() as u64);
    reply
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let now = chrono::Local::now().naive_local();
    let span = info_span!(
        "request",
        request_id = %Uuid::now_v7(),
        method = %req.method(),
        path = %req.uri().path(),
        now = %now,
    );

    async move {
        let channel = match (req.method(), req.uri().path()) {
            (&Method::GET | &Method::POST, "/ussd" | "/ussd/") => Channel::Ussd,
            (&Method::POST, "/receivetext/" | "/receivetext") => Channel::WhatsApp,
            (&Method::GET | &Method::POST, "/twilio/ivr/" | "/twilio/ivr") => Channel::Ivr,
            (&Method::GET, "/metrics") => {
                let body = format_prometheus_metrics(state.metrics(), &state.service_name);
                return Ok(response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body));
            }
            (&Method::GET, "/health") => {
                return Ok(response(StatusCode::OK, "text/plain", "ok"));
            }
            _ => return Ok(response(StatusCode::NOT_FOUND, "text/plain", "Not Found")),
        };
        Ok(handle_channel(req, channel, state, now).await)
    }
    .instrument(span)
    .await
}

/// Serve channel webhooks until `shutdown` flips to true
pub async fn start_http_server(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, service = %state.service_name, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_ussd_input_prefers_query_keys() {
        let query = params(&[("text", "98*2"), ("INPUT", ""), ("MSISDN", "+254700000001")]);
        let input = ussd_input(&query, b"text=98*4");
        assert_eq!(input.raw_text, "98*2");
        assert_eq!(input.phone, "254700000001");
    }

    #[test]
    fn test_ussd_input_falls_back_to_form_body() {
        let input = ussd_input(&Params::new(), b"INPUT=98%2A1%2AKCA123X&msisdn=254700000002");
        assert_eq!(input.raw_text, "98*1*KCA123X");
        assert_eq!(input.phone, "254700000002");
    }

    #[test]
    fn test_ussd_input_empty() {
        let input = ussd_input(&Params::new(), b"");
        assert_eq!(input.raw_text, "");
        assert_eq!(input.phone, "");
    }

    #[test]
    fn test_ivr_input_from_form_or_query() {
        let form = ivr_input(&Params::new(), b"From=%2B254700000003&Digits=2");
        assert_eq!(form.phone, "254700000003");
        assert_eq!(form.raw_text, "2");

        let query = ivr_input(&params(&[("From", "+254700000003")]), b"");
        assert_eq!(query.raw_text, "");
        assert_eq!(query.phone, "254700000003");
    }

    #[test]
    fn test_whatsapp_inputs() {
        let body = br#"{"results":[
            {"from":"+254700000004","message":{"text":" pay KCA123X "}},
            {"from":"254700000005"}
        ]}"#;
        let inputs = whatsapp_inputs(body);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].raw_text, "pay KCA123X");
        assert_eq!(inputs[0].phone, "254700000004");
        assert_eq!(inputs[1].raw_text, "");
        assert!(whatsapp_inputs(b"not json").is_empty());
    }
}
