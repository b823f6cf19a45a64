//! End-to-end encrypted regression on a small data set.
//!
//! `RUST_LOG=cipherfit=debug cargo run --release --bin regression_demo`
//! shows the level and scale of every pipeline step.

use std::time::Instant;

use cipherfit::prelude::*;
use tracing_subscriber::EnvFilter;

type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let x = [1.0, 2.0, 3.0, 5.0, 6.0, 8.0, 9.0, 10.0];
    let y = [1.5, 2.0, 4.0, 4.6, 4.7, 8.5, 8.8, 9.0];

    let start = Instant::now();
    let session = Session::new(presets::regression(SecurityLevel::Tc128)?)?;
    println!("keys generated in {:.2?}", start.elapsed());

    let start = Instant::now();
    let request = session.regression_request(&x, &y)?;
    let bytes = request.x.len()
        + request.y.len()
        + request.relin_keys.len()
        + request.galois_keys.len();
    let mib = bytes as f64 / (1 << 20) as f64;
    println!("request built in {:.2?} ({mib:.1} MiB)", start.elapsed());

    let start = Instant::now();
    let response = serve_regression(&request, &CancelToken::new())?;
    println!("server evaluated in {:.2?}", start.elapsed());

    let fit = session.finish_regression(&response)?;
    let (slope, intercept) = closed_form(&x, &y);
    println!("encrypted fit: y = {:.6}·x + {:.6}", fit.slope, fit.intercept);
    println!("cleartext fit: y = {slope:.6}·x + {intercept:.6}");
    for w in &fit.warnings {
        println!("warning: {} spread {:.2e} exceeds {:.2e}", w.quantity, w.spread, w.tolerance);
    }

    let request = session.prediction_request(&fit, 11.0)?;
    let response = serve_prediction(&request, &CancelToken::new())?;
    let prediction = session.finish_prediction(&response)?;
    println!(
        "prediction at x = 11: {:.6} (cleartext {:.6})",
        prediction.value,
        slope * 11.0 + intercept
    );
    Ok(())
}

fn closed_form(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let sx: f64 = x.iter().sum();
    let sy: f64 = y.iter().sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sxx: f64 = x.iter().map(|a| a * a).sum();
    let den = n * sxx - sx * sx;
    ((n * sxy - sx * sy) / den, (sy * sxx - sx * sxy) / den)
}
