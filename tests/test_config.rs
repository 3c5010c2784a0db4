use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use webserv::config::{Config, ConfigError, DEFAULT_PORT};

fn one_server(body: &str) -> Result<Config, ConfigError> {
    Config::parse(&format!("server {{\n{body}\n}}\n"))
}

#[test]
fn test_config_defaults() {
    let cfg = one_server("").unwrap();
    let host = &cfg.servers[0];

    assert_eq!(cfg.backlog, 500);
    assert_eq!(host.socket_addr(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
    assert_eq!(host.server_names, vec!["localhost"]);
    assert_eq!(host.root, PathBuf::from("server_root"));
    assert_eq!(host.index, vec!["index.html", "index.htm"]);
    assert_eq!(host.timeout_secs, 300);
    assert_eq!(host.client_max_body_size, 1);
    assert!(!host.autoindex);
}

#[test]
fn test_config_listen_forms() {
    let host = one_server("listen 10.1.2.3:9000;").unwrap().servers.remove(0);
    assert_eq!((host.address, host.port), (Ipv4Addr::new(10, 1, 2, 3), 9000));

    let host = one_server("listen 9000;").unwrap().servers.remove(0);
    assert_eq!((host.address, host.port), (Ipv4Addr::LOCALHOST, 9000));

    let host = one_server("listen 10.1.2.3;").unwrap().servers.remove(0);
    assert_eq!((host.address, host.port), (Ipv4Addr::new(10, 1, 2, 3), DEFAULT_PORT));
}

#[test]
fn test_config_listen_invalid_field() {
    for bad in ["listen 256.0.0.1:80;", "listen 1.2.3.4:70;", "listen nowhere;"] {
        assert!(
            matches!(one_server(bad), Err(ConfigError::InvalidField { .. })),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn test_config_error_page() {
    let cfg = one_server("root www;\nerror_page 404 /custom_404.html;").unwrap();
    assert_eq!(
        cfg.servers[0].error_page(404),
        Some(PathBuf::from("www/custom_404.html"))
    );
    assert_eq!(cfg.servers[0].error_page(403), None);

    assert!(one_server("error_page 302 /moved.html;").is_err());
}

#[test]
fn test_config_limit_except() {
    let cfg = one_server("location /api {\nlimit_except GET;\n}").unwrap();
    let route = cfg.servers[0].route("/api/items");

    assert!(route.allows("GET"));
    assert!(!route.allows("POST"));
    assert!(cfg.servers[0].route("/other").allows("POST"));
}

#[test]
fn test_config_location_overrides() {
    let cfg = one_server(
        "root www;\nclient_max_body_size 2;\nlocation /uploads {\nroot store;\nclient_max_body_size 50;\nautoindex on;\n}",
    )
    .unwrap();
    let host = &cfg.servers[0];

    let uploads = host.route("/uploads/a.bin");
    assert_eq!(uploads.root(), PathBuf::from("store"));
    assert_eq!(uploads.body_limit(), 50 * 1024 * 1024);
    assert!(uploads.autoindex());

    let other = host.route("/uploadsx");
    assert_eq!(other.root(), PathBuf::from("www"));
    assert_eq!(other.body_limit(), 2 * 1024 * 1024);
    assert_eq!(host.largest_body_limit(), 50 * 1024 * 1024);
}

#[test]
fn test_config_errors_name_the_directive() {
    match one_server("timeout 0;") {
        Err(ConfigError::DirectiveInvalidValue(d)) => assert_eq!(d, "timeout"),
        other => panic!("unexpected {other:?}"),
    }
    match one_server("root a;\nroot b;") {
        Err(ConfigError::DirectiveDuplicate(d)) => assert_eq!(d, "root"),
        other => panic!("unexpected {other:?}"),
    }
    match one_server("gzip on;") {
        Err(ConfigError::DirectiveUnknown(d)) => assert_eq!(d, "gzip"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(Config::parse("backlog 10;"), Err(ConfigError::NoServers)));
}

#[test]
fn test_config_load_from_file() {
    let path = std::env::temp_dir().join(format!("webserv-test-{}.conf", std::process::id()));
    std::fs::write(&path, "# comment\nserver {\n  listen 8181; # trailing\n}\n").unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.servers[0].port, 8181);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigError::Io { .. })));
}

#[test]
fn test_config_yaml_dump() {
    let yaml = one_server("server_name example.com;").unwrap().to_yaml().unwrap();
    assert!(yaml.contains("example.com"));
    assert!(yaml.contains("backlog: 500"));
}
