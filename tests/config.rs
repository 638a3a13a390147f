// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env var interpolation, and resolution into Settings.

use slotctl::config::*;
use slotctl::error::Error;
use slotctl::runtime::RuntimeType;
use std::collections::HashMap;
use std::time::Duration;

const MINIMAL: &str = r#"
service: shop
image: ghcr.io/acme/shop
environments:
  production:
    target_server: prod.example.com
    control_user: deploy
    slot_name: shop-prod
    production_port: 8080
    container_port: 3000
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.service, "shop");
        assert_eq!(config.image.repository(), "ghcr.io/acme/shop");
        assert_eq!(config.environments.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.temp_port_offset, 1);
        assert_eq!(config.cleanup.grace_period, Duration::from_secs(60));
        assert_eq!(config.stop.timeout, Duration::from_secs(30));
        assert_eq!(config.lease.ttl, Duration::from_secs(1800));
        assert_eq!(config.health.path, "/health");
        assert_eq!(config.health.container.max_attempts, 30);
        assert_eq!(config.backup.retention.max_per_kind, 50);
        assert!(config.runtime.is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: shop
image: registry.local:5000/acme/shop

environments:
  production:
    target_server: 10.0.0.5:2222
    control_user: deploy
    slot_name: shop-prod
    production_port: 8080
    container_port: 3000
    env_file: /opt/shop/.env
    env:
      MODE: production
    volumes:
      - /opt/shop/data:/app/data
      - /opt/shop/certs:/certs:ro
    trust_first_connection: true
  staging:
    target_server: local
    control_user: deploy
    slot_name: shop-staging
    production_port: 9080
    container_port: 3000

temp_port_offset: 100

health:
  path: /healthz
  container: { max_attempts: 10, interval: 1s, deadline: 30s }
  http: { max_attempts: 5, interval: 2s }
  request_timeout: 3s
  check:
    command: "wget -q -O /dev/null http://127.0.0.1:3000/healthz"
    retries: 5
  logs: { lines: 500, error_threshold: 10 }
  load: { requests: 50, min_success_ratio: 0.9 }

cleanup:
  grace_period: 10s

stop:
  timeout: 20s

backup:
  directory: /var/backups/shop
  data_dir: /opt/shop/data
  container_data_dir: /app/data
  config_dir: /opt/shop/config
  database_command: "pg_dump -U app app"
  retention: { max_age: 14days, max_per_kind: 10 }

lease:
  ttl: 15m

runtime: podman
runtime_socket: /run/user/1000/podman/podman.sock
"#;
        let config = Config::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.runtime, Some(RuntimeType::Podman));

        let settings = config.settings("production").unwrap();
        assert_eq!(
            settings.connection.target,
            Target::Ssh {
                host: "10.0.0.5".to_string(),
                port: 2222
            }
        );
        assert!(settings.connection.trust_first_connection);
        assert_eq!(settings.slots.temp_port, 8180);
        assert_eq!(settings.slots.volumes.len(), 2);
        assert!(settings.slots.volumes[1].read_only);
        assert_eq!(settings.slots.env["MODE"], "production");
        assert_eq!(settings.health.container.max_attempts(), 10);
        assert_eq!(settings.health.container.deadline(), Some(Duration::from_secs(30)));
        assert_eq!(settings.health.http.interval(), Duration::from_secs(2));
        assert_eq!(settings.health.error_threshold, 10);
        assert_eq!(settings.slots.healthcheck.retries, 5);
        assert_eq!(
            settings.slots.healthcheck.test,
            vec![
                "CMD-SHELL".to_string(),
                "wget -q -O /dev/null http://127.0.0.1:3000/healthz".to_string()
            ]
        );
        assert_eq!(settings.grace_period, Duration::from_secs(10));
        assert_eq!(settings.slots.stop_timeout, Duration::from_secs(20));
        assert_eq!(settings.lease_ttl, Duration::from_secs(900));
        assert_eq!(settings.backup.retention.max_per_kind, 10);
        assert_eq!(settings.backup.database_command.as_deref(), Some("pg_dump -U app app"));

        let staging = config.settings("staging").unwrap();
        assert_eq!(staging.connection.target, Target::Local);
        assert_eq!(staging.slots.name.as_str(), "shop-staging");
    }

    #[test]
    fn missing_service_returns_error() {
        let yaml = r#"
image: ghcr.io/acme/shop
environments: {}
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_image_returns_error() {
        let yaml = MINIMAL.replace("ghcr.io/acme/shop", "bad image!");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn empty_environments_fail_validation() {
        let yaml = r#"
service: shop
image: ghcr.io/acme/shop
environments: {}
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}

mod validation {
    use super::*;

    fn rejected(from: &str, to: &str) -> String {
        let config = Config::from_yaml(&MINIMAL.replace(from, to)).unwrap();
        match config.validate() {
            Err(Error::Config(message)) => message,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_ports_are_rejected() {
        assert!(rejected("production_port: 8080", "production_port: 0").contains("production_port"));
        assert!(rejected("container_port: 3000", "container_port: 0").contains("container_port"));
    }

    #[test]
    fn temp_port_must_fit() {
        let message = rejected("production_port: 8080", "production_port: 65535");
        assert!(message.contains("65535"));
    }

    #[test]
    fn health_path_needs_leading_slash() {
        let yaml = format!("{}health:\n  path: health\n", MINIMAL);
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_slot_name_fails_resolution() {
        let config = Config::from_yaml(&MINIMAL.replace("shop-prod", "Shop_Prod")).unwrap();
        assert!(config.settings("production").is_err());
    }

    #[test]
    fn user_in_target_is_rejected() {
        let config =
            Config::from_yaml(&MINIMAL.replace("prod.example.com", "root@prod.example.com")).unwrap();
        let err = config.settings("production").unwrap_err();
        assert!(err.to_string().contains("control_user"));
    }

    #[test]
    fn unknown_environment_returns_error() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert!(matches!(
            config.settings("staging"),
            Err(Error::UnknownEnvironment(name)) if name == "staging"
        ));
    }
}

mod settings {
    use super::*;

    #[test]
    fn temp_port_follows_offset() {
        let settings = Config::from_yaml(MINIMAL).unwrap().settings("production").unwrap();
        assert_eq!(settings.slots.production_port, 8080);
        assert_eq!(settings.slots.temp_port, 8081);
        assert_eq!(settings.state_dir, STATE_DIR);
    }

    #[test]
    fn default_healthcheck_fetches_health_path() {
        let settings = Config::from_yaml(MINIMAL).unwrap().settings("production").unwrap();
        let test = &settings.slots.healthcheck.test;
        assert_eq!(test[0], "CMD-SHELL");
        assert!(test[1].contains("http://127.0.0.1:3000/health"));
    }

    #[test]
    fn deploy_argument_selects_image() {
        let settings = Config::from_yaml(MINIMAL).unwrap().settings("production").unwrap();
        assert_eq!(settings.deploy_image("v2").unwrap().to_string(), "ghcr.io/acme/shop:v2");
        assert_eq!(
            settings.deploy_image("docker.io/library/nginx:1.27").unwrap().to_string(),
            "docker.io/library/nginx:1.27"
        );
    }
}

mod env_vars {
    use super::*;

    #[test]
    fn literal_value() {
        let yaml = format!("{}    env:\n      KEY: \"value\"\n", MINIMAL);
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.environments["production"].env.get("KEY"),
            Some(&EnvValue::Literal("value".to_string()))
        );
    }

    #[test]
    fn env_reference_with_default() {
        let yaml = format!(
            "{}    env:\n      OPTIONAL:\n        env: OPTIONAL_VAR\n        default: \"fallback\"\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        match config.environments["production"].env.get("OPTIONAL") {
            Some(EnvValue::FromEnv {
                var,
                default: Some(def),
            }) => {
                assert_eq!(var, "OPTIONAL_VAR");
                assert_eq!(def, "fallback");
            }
            _ => panic!("Expected FromEnv with default"),
        }
    }

    #[test]
    fn resolve_env_values() {
        let mut env_map = HashMap::new();
        env_map.insert("KEY".to_string(), EnvValue::Literal("literal".to_string()));
        env_map.insert(
            "FROM_ENV".to_string(),
            EnvValue::FromEnv {
                var: "SLOTCTL_TEST_VAR".to_string(),
                default: None,
            },
        );
        env_map.insert(
            "WITH_DEFAULT".to_string(),
            EnvValue::FromEnv {
                var: "SLOTCTL_MISSING_VAR".to_string(),
                default: Some("default_value".to_string()),
            },
        );

        temp_env::with_var("SLOTCTL_TEST_VAR", Some("from_environment"), || {
            let resolved = resolve_env_map(&env_map).unwrap();

            assert_eq!(resolved.get("KEY"), Some(&"literal".to_string()));
            assert_eq!(
                resolved.get("FROM_ENV"),
                Some(&"from_environment".to_string())
            );
            assert_eq!(
                resolved.get("WITH_DEFAULT"),
                Some(&"default_value".to_string())
            );
        });
    }

    #[test]
    fn missing_variable_fails_settings() {
        let yaml = format!(
            "{}    env:\n      SECRET:\n        env: SLOTCTL_UNSET_SECRET\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        temp_env::with_var_unset("SLOTCTL_UNSET_SECRET", || {
            assert!(matches!(
                config.settings("production"),
                Err(Error::MissingEnvVar(var)) if var == "SLOTCTL_UNSET_SECRET"
            ));
        });
    }
}

mod discovery {
    use super::*;

    #[test]
    fn discover_finds_yml_then_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_ALT), MINIMAL).unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().service, "shop");
    }

    #[test]
    fn discover_without_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("shop"), Some("ghcr.io/acme/shop"), false).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        config.validate().unwrap();
        assert!(matches!(
            init_config(dir.path(), None, None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), None, None, true).unwrap();
    }
}
