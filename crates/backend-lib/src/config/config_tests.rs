//
use super::*;
use figment::Jail;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn valid() -> Settings {
    Settings {
        signing_secret: Some(SECRET.to_string()),
        hash_cost_factor: 4,
        ..Settings::default()
    }
}

#[test]
fn test_settings_validation() {
    assert!(valid().validate().is_ok());

    // Missing secret
    let mut invalid = valid();
    invalid.signing_secret = None;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::MisconfiguredSigningSecret)
    ));

    // Short secret
    let mut invalid = valid();
    invalid.signing_secret = Some("too-short".to_string());
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::MisconfiguredSigningSecret)
    ));

    // Hash cost out of range
    let mut invalid = valid();
    invalid.hash_cost_factor = 40;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidHashCost(40))
    ));

    // Invalid log level
    let mut invalid = valid();
    invalid.log_level = "invalid".to_string();
    assert!(invalid.validate().is_err());

    // Zero lifetime
    let mut invalid = valid();
    invalid.lifetime_seconds = 0;
    assert!(invalid.validate().is_err());

    // Weak password rules
    let mut invalid = valid();
    invalid.password_requirements.min_length = 4;
    assert!(invalid.validate().is_err());

    // Rate limit disabled by zero
    let mut invalid = valid();
    invalid.rate_limit.max_failed_attempts = 0;
    assert!(invalid.validate().is_err());

    // Relative sign-in path
    let mut invalid = valid();
    invalid.sign_in_path = "sign-in".to_string();
    assert!(invalid.validate().is_err());
}

#[test]
fn test_route_settings() {
    let mut settings = valid();
    settings.routes = vec![RouteRule {
        pattern: "/admin/*".to_string(),
        access: AccessKind::Restricted,
        roles: vec![],
    }];
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::InvalidRoute { .. })
    ));

    let mut settings = valid();
    settings.default_access = AccessKind::Restricted;
    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

    settings.default_roles = vec![Role::Admin];
    assert_eq!(
        settings.default_route_access().unwrap(),
        RouteAccess::only(Role::Admin)
    );
}

#[test]
fn test_debug_redacts_secret() {
    let debug = format!("{:?}", valid());
    assert!(!debug.contains(SECRET));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_session_lifetimes() {
    let lifetimes = valid().session_lifetimes();
    assert_eq!(lifetimes.select(false), 86_400);
    assert_eq!(lifetimes.select(true), 2_592_000);
}

#[test]
fn test_load_settings() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            &format!(
                r#"
                signing_secret = "{SECRET}"
                hash_cost_factor = 10
                bind_addr = "127.0.0.1:4000"
                data_dir = "test_data"
                log_level = "debug"
                lifetime_seconds = 3600

                [rate_limit]
                max_failed_attempts = 3

                [[routes]]
                pattern = "/admin/*"
                access = "restricted"
                roles = ["admin"]

                [[routes]]
                pattern = "/"
                access = "public"
                "#
            ),
        )?;

        // Environment variable takes precedence
        jail.set_env("DASHKIT_LOG_LEVEL", "warn");
        jail.set_env("DASHKIT_RATE_LIMIT__LOCKOUT_SECS", "60");

        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.bind_addr.to_string(), "127.0.0.1:4000");
        assert_eq!(settings.data_dir, PathBuf::from("test_data"));
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.hash_cost_factor, 10);
        assert_eq!(settings.lifetime_seconds, 3600);
        assert_eq!(settings.remember_me_lifetime_seconds, 2_592_000);
        assert_eq!(settings.rate_limit.max_failed_attempts, 3);
        assert_eq!(settings.rate_limit.lockout_secs, 60);

        let table = settings.route_table().map_err(|e| e.to_string())?;
        assert_eq!(table.resolve("/"), &RouteAccess::Public);
        assert_eq!(table.resolve("/admin/users"), &RouteAccess::only(Role::Admin));
        assert_eq!(table.resolve("/reports"), &RouteAccess::Authenticated);
        Ok(())
    });
}

#[test]
fn test_load_requires_secret() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", r#"log_level = "info""#)?;
        assert!(matches!(
            Settings::load(),
            Err(ConfigError::MisconfiguredSigningSecret)
        ));

        jail.set_env("DASHKIT_SIGNING_SECRET", SECRET);
        jail.set_env("DASHKIT_HASH_COST_FACTOR", "4");
        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.signing_secret.as_deref(), Some(SECRET));
        Ok(())
    });
}

#[test]
fn test_load_rejects_bad_types() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", r#"hash_cost_factor = "high""#)?;
        assert!(matches!(Settings::load(), Err(ConfigError::Load(_))));
        Ok(())
    });
}
