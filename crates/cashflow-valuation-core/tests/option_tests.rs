#![cfg(feature = "real_options")]

use cashflow_valuation_core::real_options::black_scholes::{
    black_scholes_call, value_waiting_option, OptionInputs, ZeroVolatilityPolicy,
};
use cashflow_valuation_core::real_options::decision::{recommend, Recommendation};

#[test]
fn test_black_scholes_reference() {
    // d1 = (0.03 + 0.02) / 0.2 = 0.25, d2 = 0.05
    // C = 100 * N(0.25) - 100 * e^-0.03 * N(0.05) = 9.4134
    let out = black_scholes_call(&OptionInputs::waiting_option(100.0, 1.0, 0.03, 0.2)).unwrap();
    assert_eq!(format!("{:.2}", out.value), "9.41");
}

#[test]
fn test_waiting_option_scales_with_npv() {
    let small = black_scholes_call(&OptionInputs::waiting_option(100.0, 1.0, 0.03, 0.3)).unwrap();
    let large = black_scholes_call(&OptionInputs::waiting_option(1000.0, 1.0, 0.03, 0.3)).unwrap();
    assert!((large.value / small.value - 10.0).abs() < 1e-9);
}

#[test]
fn test_value_increases_with_volatility_and_time() {
    let base = OptionInputs::waiting_option(250.0, 1.0, 0.03, 0.2);
    let v0 = black_scholes_call(&base).unwrap().value;
    let more_vol = black_scholes_call(&OptionInputs { volatility: 0.4, ..base }).unwrap().value;
    let more_time = black_scholes_call(&OptionInputs { time_to_decision: 2.0, ..base }).unwrap().value;
    assert!(more_vol > v0);
    assert!(more_time > v0);
}

#[test]
fn test_zero_volatility_fallback_and_strict_mode() {
    let inputs = OptionInputs::waiting_option(100.0, 1.0, 0.03, 0.0);
    let lenient = value_waiting_option(&inputs, ZeroVolatilityPolicy::default()).unwrap();
    assert!((lenient.value - 2.9554).abs() < 1e-4);
    assert!(value_waiting_option(&inputs, ZeroVolatilityPolicy::Fail).is_err());
}

#[test]
fn test_decision_against_option_value() {
    let option_value = black_scholes_call(&OptionInputs::waiting_option(60.75, 1.0, 0.03, 0.25))
        .unwrap()
        .value;
    // an at-the-money option is worth a fraction of its spot
    assert_eq!(recommend(60.75, option_value), Recommendation::InvestNow);
    assert_eq!(recommend(option_value, option_value), Recommendation::Wait);
    assert_eq!(recommend(-10.0, 0.0), Recommendation::Wait);
}
