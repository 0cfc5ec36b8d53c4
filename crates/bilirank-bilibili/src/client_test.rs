use super::*;

fn test_options() -> ClientOptions {
    ClientOptions {
        timeout_secs: 5,
        user_agent: "bilirank-test/0.1".to_string(),
        cookie: None,
        max_retries: 0,
        backoff_base_ms: 0,
        reply_page_delay_ms: 0,
    }
}

#[test]
fn endpoint_joins_base_path_and_query() {
    let client = BilibiliClient::with_base_url(test_options(), "http://localhost:9/").unwrap();
    assert_eq!(
        client.endpoint("/x/v2/reply", "type=1&oid=2"),
        "http://localhost:9/x/v2/reply?type=1&oid=2"
    );
    assert_eq!(
        client.endpoint("/x/web-interface/nav", ""),
        "http://localhost:9/x/web-interface/nav"
    );
}

#[test]
fn rejects_cookie_with_control_characters() {
    let options = ClientOptions {
        cookie: Some("SESSDATA=abc\nInjected: 1".to_string()),
        ..test_options()
    };
    let result = BilibiliClient::with_base_url(options, "http://localhost:9");
    assert!(
        matches!(result, Err(BilibiliError::InvalidInput(_))),
        "expected InvalidInput"
    );
}

#[test]
fn blank_cookie_is_ignored() {
    let options = ClientOptions {
        cookie: Some("   ".to_string()),
        ..test_options()
    };
    assert!(BilibiliClient::with_base_url(options, "http://localhost:9").is_ok());
}

#[test]
fn unwrap_envelope_maps_nonzero_code_to_api_error() {
    let envelope: ApiEnvelope<NavData> = ApiEnvelope {
        code: -352,
        message: "风控校验失败".to_string(),
        data: None,
    };
    let err = BilibiliClient::unwrap_envelope(envelope, "search").unwrap_err();
    assert!(
        matches!(err, BilibiliError::Api { code: -352, .. }),
        "expected Api, got: {err:?}"
    );
}

#[test]
fn unwrap_envelope_requires_data_on_success() {
    let envelope: ApiEnvelope<NavData> = ApiEnvelope {
        code: 0,
        message: "0".to_string(),
        data: None,
    };
    let err = BilibiliClient::unwrap_envelope(envelope, "nav").unwrap_err();
    assert!(
        matches!(err, BilibiliError::MissingData { .. }),
        "expected MissingData, got: {err:?}"
    );
}

#[test]
fn options_follow_app_config() {
    let mut config =
        bilirank_core::build_app_config(|_| Err(std::env::VarError::NotPresent)).unwrap();
    config.bilibili_cookie = Some("SESSDATA=x".to_string());
    config.http_max_retries = 4;
    let options = ClientOptions::from_app_config(&config);
    assert_eq!(options.cookie.as_deref(), Some("SESSDATA=x"));
    assert_eq!(options.max_retries, 4);
    assert_eq!(options.reply_page_delay_ms, 100);
}

#[test]
fn strip_highlight_removes_markup_and_entities() {
    assert_eq!(
        strip_highlight(r#"<em class="keyword">扫地机器人</em>横评 &amp; 选购"#),
        "扫地机器人横评 & 选购"
    );
    assert_eq!(strip_highlight("plain"), "plain");
}
