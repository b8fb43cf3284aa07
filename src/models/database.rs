//! Database connection profile, read from an InterMine mine properties file.

use super::ProjectError;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_PORT: u16 = 5432;

/// Connection details for the mine's database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseProfile {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl DatabaseProfile {
    /// Read `db.<alias>.datasource.*` from a mine properties file.
    pub fn from_properties_file(path: &Path, alias: &str) -> Result<Self, ProjectError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProjectError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_properties(&parse_properties(&content), alias, path)
    }

    fn from_properties(
        props: &HashMap<String, String>,
        alias: &str,
        path: &Path,
    ) -> Result<Self, ProjectError> {
        let prefix = format!("db.{alias}.datasource.");
        let get = |field: &str| props.get(&format!("{prefix}{field}")).cloned();
        let require = |field: &str| {
            get(field).ok_or_else(|| ProjectError::MissingProperty {
                path: path.to_owned(),
                key: format!("{prefix}{field}"),
            })
        };

        let port = match get("port") {
            Some(raw) => raw.parse().map_err(|_| ProjectError::InvalidProperty {
                path: path.to_owned(),
                key: format!("{prefix}port"),
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: require("serverName")?,
            port,
            name: require("databaseName")?,
            user: require("user")?,
            password: get("password").filter(|p| !p.is_empty()),
        })
    }

    /// Environment understood by the PostgreSQL client tools.
    pub fn pg_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("PGHOST", self.host.clone()),
            ("PGPORT", self.port.to_string()),
            ("PGUSER", self.user.clone()),
        ];
        if let Some(password) = &self.password {
            env.push(("PGPASSWORD", password.clone()));
        }
        env
    }
}

/// Parse `key=value` / `key: value` lines, skipping blanks and `#`/`!` comments.
fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}
