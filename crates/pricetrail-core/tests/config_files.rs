#![forbid(unsafe_code)]

use pretty_assertions::assert_eq;
use pricetrail_core::{ConfigError, LensConfig, ProviderConfig, ProxyPolicy};

const FULL_TOML: &str = r#"
marker_class = "chart-box"
guard_attribute = "data-chart-box"
throttle_window_ms = 300
navigation_settle_ms = 80
lookahead_margin_px = 400
load_deadline_ms = 1500
proxy_deadline_ms = 8000
idle_timeout_ms = 500
proxy_fallback = true

[[providers]]
name = "keepa"
label = "Keepa:"
image_template = "https://graph.keepa.com/pricehistory.png?used=1&amazon=1&new=1&domain={domain}&asin={asin}"
link_template = "https://keepa.com/#!product/{domain}-{asin}"
alt_text = "Price history (Keepa)"

[[providers]]
name = "camelcamelcamel"
label = "CamelCamelCamel:"
image_template = "https://charts.camelcamelcamel.com/{locale}/{asin}/amazon-new-used.png?force=1&zero=0&w=725&h=440&desired=false&legend=1&ilt=1&tp=all&fo=0"
link_template = "https://{subdomain}camelcamelcamel.com/product/{asin}"
alt_text = "Price history (CamelCamelCamel)"
"#;

fn scratch_file(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pricetrail-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).expect("write scratch config");
    path
}

#[test]
fn full_toml_file_loads_and_validates() {
    let path = scratch_file("full.toml", FULL_TOML);
    let config = LensConfig::from_file(&path)
        .and_then(LensConfig::validated)
        .expect("valid config");
    std::fs::remove_file(&path).ok();

    assert_eq!(config.marker_class, "chart-box");
    assert_eq!(config.root_margin(), "400px");
    assert_eq!(
        config.providers,
        vec![ProviderConfig::keepa(), ProviderConfig::camelcamelcamel()]
    );
    assert_eq!(
        ProxyPolicy::from_config(&config).allowed_hosts(),
        ["charts.camelcamelcamel.com", "graph.keepa.com"]
    );
}

#[test]
fn json_file_is_picked_by_extension() {
    let path = scratch_file("small.json", r#"{"lookahead_margin_px": 0}"#);
    let config = LensConfig::from_file(&path).expect("json parses");
    std::fs::remove_file(&path).ok();
    assert_eq!(config.root_margin(), "0px");
}

#[test]
fn missing_file_is_an_io_error() {
    let missing = std::env::temp_dir().join("pricetrail-does-not-exist.toml");
    assert!(matches!(LensConfig::from_file(missing), Err(ConfigError::Io(_))));
}

#[test]
fn insecure_provider_is_rejected_with_its_index() {
    let toml = r#"
[[providers]]
name = "plain"
label = "Plain:"
image_template = "http://charts.example/{asin}.png"
link_template = "https://charts.example/{asin}"
alt_text = "chart"
"#;
    let err = LensConfig::from_toml_str(toml)
        .and_then(LensConfig::validated)
        .expect_err("http image rejected");
    match err {
        ConfigError::Invalid(problems) => assert_eq!(
            problems,
            vec!["providers[0].image_template must be an https URL".to_string()]
        ),
        other => panic!("unexpected error {other}"),
    }
}
