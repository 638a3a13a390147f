// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented slotctl.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, SlotName};

use super::CONFIG_FILENAME;

/// Write `slotctl.yml` into `dir`. Refuses to overwrite unless `force`.
pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);
    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = service.unwrap_or("my-app");
    let slot_name = SlotName::new(&format!("{}-prod", service))
        .map_err(|e| Error::Config(format!("service name {:?} cannot name slots: {}", service, e)))?;
    let image = match image {
        Some(i) => ImageRef::parse(i).map_err(|e| Error::Config(e.to_string()))?,
        None => ImageRef::parse(&format!("registry.example.com/{}", service))
            .map_err(|e| Error::Config(e.to_string()))?,
    };

    std::fs::write(&config_path, template(service, &image.repository(), &slot_name))?;
    Ok(())
}

fn template(service: &str, repository: &str, slot_name: &SlotName) -> String {
    format!(
        r#"service: {service}
image: {repository}

environments:
  production:
    target_server: server.example.com   # or "local"
    control_user: deploy
    slot_name: {slot_name}
    production_port: 8080
    container_port: 3000
    # env_file: /opt/{service}/.env.production
    # volumes:
    #   - /opt/{service}/data:/app/data
    # SSH host key verification (default: false)
    # trust_first_connection: true

health:
  path: /health
  container: {{ max_attempts: 30, interval: 2s }}
  http: {{ max_attempts: 10, interval: 3s }}
  request_timeout: 5s

cleanup:
  grace_period: 60s

backup:
  directory: ~/.local/share/slotctl/backups
  # data_dir: /opt/{service}/data
  # container_data_dir: /app/data
  retention: {{ max_age: 30days, max_per_kind: 50 }}

lease:
  ttl: 30m
"#
    )
}
