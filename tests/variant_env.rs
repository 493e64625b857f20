//! `NDIPLAY_VARIANT` overrides the configured variant.
//!
//! Kept in its own test binary because it mutates the process environment.

use ndiplay::capability::VARIANT_ENV;
use ndiplay::{BuildVariant, CapabilityController, PlayerConfig};

#[test]
fn environment_variant_wins_over_config() {
    let config = PlayerConfig::from_yaml_str("variant: release\n").unwrap();

    // SAFETY: the only test in this binary, so no other thread reads the environment.
    unsafe { std::env::set_var(VARIANT_ENV, "LowEnd") };
    assert_eq!(CapabilityController::variant_from_env().unwrap(), Some(BuildVariant::LowEnd));
    let profile = config.profile().unwrap();
    assert_eq!(profile.variant(), BuildVariant::LowEnd);
    assert_eq!(profile.target_fps(), 20);

    unsafe { std::env::set_var(VARIANT_ENV, "turbo") };
    assert!(config.profile().is_err());

    unsafe { std::env::remove_var(VARIANT_ENV) };
    assert_eq!(config.profile().unwrap().variant(), BuildVariant::Release);
}
