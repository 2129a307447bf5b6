//! Mock push-payment and Operator B fee API
//!
//! Stands in for the M-Pesa push endpoint and the partner fee lookup so the
//! gateway can run locally without real credentials.
//!
//! Endpoints:
//! - `POST /pushpayment/` with `{"carno", "phone"}` → `{"code": 200}`, or
//!   `{"code": 400}` for declined plates
//! - `GET /fee?plate=<PLATE>` → `{"amount": <n>}`, `{"amount": null}` if unknown
//!
//! Usage:
//!   cargo run --bin mock_pushpay -- --port 8090 --fee KCA123X=200 --decline KBZ001A
//!
//! Point the gateway at it with `push_url = "http://localhost:8090/pushpayment/"`
//! and `fee_url = "http://localhost:8090/fee"`.

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "mock_pushpay")]
#[command(about = "Mock M-Pesa push and Operator B fee API for local runs")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8090")]
    port: u16,

    /// Fee owed for a plate at Operator B, as PLATE=AMOUNT (repeatable)
    #[arg(long = "fee", value_parser = parse_fee)]
    fees: Vec<(String, u64)>,

    /// Plates whose push is declined with code 400 (repeatable)
    #[arg(long = "decline")]
    declined: Vec<String>,
}

fn parse_fee(raw: &str) -> Result<(String, u64), String> {
    let (plate, amount) = raw.split_once('=').ok_or_else(|| format!("expected PLATE=AMOUNT, got {raw:?}"))?;
    let amount = amount.trim().parse::<u64>().map_err(|e| format!("bad amount in {raw:?}: {e}"))?;
    Ok((plate.trim().to_uppercase(), amount))
}

struct MockState {
    fees: HashMap<String, u64>,
    declined: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct PushRequest {
    carno: String,
    phone: String,
}

fn json(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method().clone(), req.uri().path()) {
        (Method::POST, "/pushpayment/" | "/pushpayment") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    eprintln!("[MOCK] Body read error: {}", e);
                    return Ok(json(StatusCode::BAD_REQUEST, r#"{"code":400}"#.to_string()));
                }
            };
            let Ok(push) = serde_json::from_slice::<PushRequest>(&body) else {
                eprintln!("[MOCK] Malformed push body: {}", String::from_utf8_lossy(&body));
                return Ok(json(StatusCode::BAD_REQUEST, r#"{"code":400}"#.to_string()));
            };
            let code = if state.declined.contains(&push.carno.to_uppercase()) { 400 } else { 200 };
            println!("[MOCK] Push for {} to {} -> code {}", push.carno, push.phone, code);
            Ok(json(StatusCode::OK, format!(r#"{{"code":{code}}}"#)))
        }
        (Method::GET, "/fee") => {
            let query: HashMap<String, String> =
                serde_urlencoded::from_str(req.uri().query().unwrap_or_default()).unwrap_or_default();
            let plate = query.get("plate").map(|p| p.to_uppercase()).unwrap_or_default();
            let amount = state.fees.get(&plate);
            println!("[MOCK] Fee lookup for {} -> {:?}", plate, amount);
            let body = match amount {
                Some(amount) => format!(r#"{{"amount":{amount}}}"#),
                None => r#"{"amount":null}"#.to_string(),
            };
            Ok(json(StatusCode::OK, body))
        }
        _ => Ok(json(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#.to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           Mock Push-Payment / Fee API                    ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Port:            {:>5}                                   ║", args.port);
    println!("║ Fees configured: {:>5}                                   ║", args.fees.len());
    println!("║ Declined plates: {:>5}                                   ║", args.declined.len());
    println!("╚══════════════════════════════════════════════════════════╝");

    let state = Arc::new(MockState {
        fees: args.fees.into_iter().collect(),
        declined: args.declined.iter().map(|p| p.to_uppercase()).collect(),
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                eprintln!("[MOCK] Connection error from {}: {}", peer, e);
            }
        });
    }
}
