use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_url, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_secret_redaction(false)
        .with_spans(true)
        .with_target(false);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_secrets);
    assert!(config.enable_spans);
    assert!(!config.display_target);
}

#[test]
fn test_provider_credentials_are_redacted() {
    for field in [
        "access_token",
        "DROPBOX_ACCESS_TOKEN",
        "api_key",
        "api_secret",
        "signature",
        "Authorization",
    ] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{field}");
    }
}

#[test]
fn test_media_fields_pass_through() {
    assert_eq!(redact_if_sensitive("backend", "cloudinary"), "cloudinary");
    assert_eq!(redact_if_sensitive("kind", "video"), "video");
    assert_eq!(
        redact_url("https://dl.dropboxusercontent.com/s/abc/x.mov"),
        "https://dl.dropboxusercontent.com/s/abc/x.mov"
    );
}

#[test]
fn test_path_stripping() {
    assert_eq!(
        strip_path("/srv/shop/public/uploads/videos/1700000000000-ab12cd.mp4"),
        "1700000000000-ab12cd.mp4"
    );
    assert_eq!(strip_path("D:\\shop\\uploads\\images\\a.jpg"), "a.jpg");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_second_install_is_rejected() {
    let config = || LoggingConfig::default().with_format(LogFormat::Compact);

    init_logging(config()).unwrap();
    assert!(init_logging(config()).is_err());
}

#[test]
fn test_bad_filter_is_a_config_error() {
    let err = init_logging(LoggingConfig::default().with_filter("core_media=loud")).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}
