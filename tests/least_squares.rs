use std::sync::OnceLock;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use cipherfit::prelude::*;
use cipherfit::regression::{encode_count, handle_regression, Count};

const X: [f64; 8] = [1.0, 2.0, 3.0, 5.0, 6.0, 8.0, 9.0, 10.0];
const Y: [f64; 8] = [1.5, 2.0, 4.0, 4.6, 4.7, 8.5, 8.8, 9.0];

// N = 8, Σx = 44, Σy = 43.1, Σxy = 305.9, Σx² = 320
const NUMERATOR_SLOPE: f64 = 550.8;
const NUMERATOR_INTERCEPT: f64 = 332.4;
const DENOMINATOR: f64 = 624.0;

fn session() -> &'static Session {
    static SESSION: OnceLock<Session> = OnceLock::new();
    SESSION.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let params = presets::regression(SecurityLevel::Tc128).unwrap();
        Session::with_rng(params, ClientConfig::default(), &mut rng).unwrap()
    })
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

fn first_slot(session: &Session, ct: &Ciphertext) -> f64 {
    match session.decrypt(ct).unwrap() {
        SlotValues::Reals(v) => v[0],
        other => panic!("expected reals, got {other:?}"),
    }
}

#[test]
fn test_fit_matches_closed_form() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    let response = serve_regression(&request, &CancelToken::new()).unwrap();
    let fit = session.finish_regression(&response).unwrap();

    assert!((fit.slope - NUMERATOR_SLOPE / DENOMINATOR).abs() < 1e-2, "slope {}", fit.slope);
    assert!(
        (fit.intercept - NUMERATOR_INTERCEPT / DENOMINATOR).abs() < 1e-2,
        "intercept {}",
        fit.intercept
    );
}

#[test]
fn test_outputs_share_level_two() {
    let session = session();
    let ev = session.evaluator();
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let x = session.encrypt_with_rng(&SlotValues::Reals(X.to_vec()), &mut rng).unwrap();
    let y = session.encrypt_with_rng(&SlotValues::Reals(Y.to_vec()), &mut rng).unwrap();
    let count = encode_count(session.context(), X.len() as u64, 1).unwrap();

    let fit = least_squares(
        &ev, &x, &y, &count, session.relin_keys(), session.galois_keys(), &CancelToken::new(),
    )
    .unwrap();
    for ct in [&fit.numerator_slope, &fit.numerator_intercept, &fit.denominator] {
        assert_eq!(ct.level(), 2);
        assert_eq!(ct.size(), 1);
    }
    assert!((first_slot(session, &fit.denominator) - DENOMINATOR).abs() < 0.5);
    assert!((first_slot(session, &fit.numerator_slope) - NUMERATOR_SLOPE).abs() < 0.5);
    assert!((first_slot(session, &fit.numerator_intercept) - NUMERATOR_INTERCEPT).abs() < 0.5);
}

#[test]
fn test_prediction_follows_fit() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(9);
    let fit = LinearFit {
        slope: NUMERATOR_SLOPE / DENOMINATOR,
        intercept: NUMERATOR_INTERCEPT / DENOMINATOR,
        warnings: Vec::new(),
    };
    let request = session.prediction_request_with_rng(&fit, 11.0, &mut rng).unwrap();
    let response = serve_prediction(&request, &CancelToken::new()).unwrap();
    let prediction = session.finish_prediction(&response).unwrap();

    let expected = fit.slope * 11.0 + fit.intercept;
    assert!((prediction.value - expected).abs() < 1e-3, "{} vs {}", prediction.value, expected);
}

#[test]
fn test_encoded_count_matches_scalar_count() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(10);
    let mut request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    let count = encode_count(session.context(), X.len() as u64, 1).unwrap();
    request.count = Count::Encoded(count.save().unwrap());

    let response = serve_regression(&request, &CancelToken::new()).unwrap();
    let fit = session.finish_regression(&response).unwrap();
    assert!((fit.slope - NUMERATOR_SLOPE / DENOMINATOR).abs() < 1e-2);
}

#[test]
fn test_short_and_mismatched_inputs_are_rejected() {
    let session = session();
    assert!(matches!(
        session.regression_request(&X[..2], &Y[..2]),
        Err(CipherfitError::InvalidInput(_))
    ));
    assert!(matches!(
        session.regression_request(&X, &Y[..7]),
        Err(CipherfitError::DimensionMismatch { expected: 8, got: 7 })
    ));

    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let mut request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    request.count = Count::Scalar(2);
    let failure = handle_regression(&request, &CancelToken::new()).unwrap_err();
    assert_eq!(failure.kind, ErrorKind::InvalidInput);
}

#[test]
fn test_cancelled_request_stops() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(12);
    let request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(serve_regression(&request, &cancel), Err(CipherfitError::Cancelled)));
    assert_eq!(handle_regression(&request, &cancel).unwrap_err().kind, ErrorKind::Cancelled);
}

#[test]
fn test_corrupt_parameters_report_serialization_failure() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(13);
    let mut request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    request.parameters = b"not parameters".to_vec();
    let failure = handle_regression(&request, &CancelToken::new()).unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Serialization);
}

#[test]
fn test_inputs_too_deep_exceed_depth() {
    let session = session();
    let ev = session.evaluator();
    let mut rng = ChaCha20Rng::seed_from_u64(14);
    let x = session.encrypt_with_rng(&SlotValues::Reals(X.to_vec()), &mut rng).unwrap();
    let y = session.encrypt_with_rng(&SlotValues::Reals(Y.to_vec()), &mut rng).unwrap();
    let x = ev.mod_switch_to(&x, 1).unwrap();
    let y = ev.mod_switch_to(&y, 1).unwrap();
    let count = encode_count(session.context(), 8, 2).unwrap();

    let result = least_squares(
        &ev, &x, &y, &count, session.relin_keys(), session.galois_keys(), &CancelToken::new(),
    );
    assert!(matches!(result, Err(CipherfitError::DepthExceeded(_))));
}

#[test]
fn test_batched_scheme_has_no_least_squares() {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let params = presets::batched(SecurityLevel::Tc128).unwrap();
    let session = Session::with_rng(params, ClientConfig::default(), &mut rng).unwrap();
    let x = session.encrypt_with_rng(&SlotValues::Integers(vec![1, 2, 3]), &mut rng).unwrap();
    let count = session.encoder().encode(&SlotValues::Integers(vec![3]), None, None).unwrap();

    let ev = session.evaluator();
    let result = least_squares(
        &ev, &x, &x, &count, session.relin_keys(), session.galois_keys(), &CancelToken::new(),
    );
    assert!(matches!(result, Err(CipherfitError::Unsupported { .. })));
    assert!(matches!(
        session.regression_request(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]),
        Err(CipherfitError::Unsupported { .. })
    ));
}

const HEIGHTS_CM: [f64; 10] = [
    160.0, 165.0, 170.0, 175.0, 180.0, 185.0, 190.0, 172.0, 168.0, 178.0,
];
const WEIGHTS_KG: [f64; 10] = [55.0, 60.0, 66.0, 70.0, 76.0, 82.0, 88.0, 68.0, 63.0, 74.0];

#[test]
fn test_large_data_rejected_before_encryption() {
    let session = session();
    let err = session.regression_request(&HEIGHTS_CM, &WEIGHTS_KG).unwrap_err();
    assert!(matches!(err, CipherfitError::InvalidInput(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_rescaled_large_data_fit() {
    let session = session();
    let mut rng = ChaCha20Rng::seed_from_u64(15);
    let x: Vec<f64> = HEIGHTS_CM.iter().map(|h| h / 100.0).collect();
    let y: Vec<f64> = WEIGHTS_KG.iter().map(|w| w / 100.0).collect();
    let (slope, intercept) = closed_form(&x, &y);

    let request = session.regression_request_with_rng(&x, &y, &mut rng).unwrap();
    let response = serve_regression(&request, &CancelToken::new()).unwrap();
    let fit = session.finish_regression(&response).unwrap();
    assert!((fit.slope - slope).abs() < 1e-2, "slope {} vs {}", fit.slope, slope);
    assert!(
        (fit.intercept - intercept).abs() < 1e-2,
        "intercept {} vs {}",
        fit.intercept,
        intercept
    );
}

#[test]
fn test_fit_and_prediction_at_smaller_scale() {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let params = presets::regression(SecurityLevel::Tc128).unwrap();
    let config = ClientConfig { scale: (1u64 << 35) as f64, ..ClientConfig::default() };
    let session = Session::with_rng(params, config, &mut rng).unwrap();

    let request = session.regression_request_with_rng(&X, &Y, &mut rng).unwrap();
    let response = serve_regression(&request, &CancelToken::new()).unwrap();
    let fit = session.finish_regression(&response).unwrap();
    assert!((fit.slope - NUMERATOR_SLOPE / DENOMINATOR).abs() < 1e-2, "slope {}", fit.slope);

    let request = session.prediction_request_with_rng(&fit, 11.0, &mut rng).unwrap();
    let response = serve_prediction(&request, &CancelToken::new()).unwrap();
    let prediction = session.finish_prediction(&response).unwrap();
    let expected = fit.slope * 11.0 + fit.intercept;
    assert!((prediction.value - expected).abs() < 1e-3, "{} vs {}", prediction.value, expected);
}
