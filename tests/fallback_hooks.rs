//! Fallback call counting. Kept in its own test binary so no other test
//! touches the shared counter.
#![cfg(feature = "test-hooks")]

use serde_json::json;

use qrintent_core::config::{Kwargs, RenderingConfig};
use qrintent_core::degradation::{get_fallback_call_count, reset_fallback_call_count, DegradationManager};

#[test]
fn check_only_never_calls_fallback() {
    let mut kwargs = Kwargs::new();
    kwargs.insert("dark".into(), json!("yellow"));
    kwargs.insert("centerpiece_enabled".into(), json!(true));
    kwargs.insert("centerpiece_size".into(), json!(0.45));
    let config = RenderingConfig::from_kwargs(&kwargs).unwrap();
    let manager = DegradationManager::default();

    reset_fallback_call_count();
    let result = manager.check_only(&config);
    assert_eq!(result.warnings.len(), 2);
    assert_eq!(get_fallback_call_count(), 0);

    manager.apply_degradation(&config, false);
    assert_eq!(get_fallback_call_count(), 2);
}
