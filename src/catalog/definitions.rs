//! Data source definitions
//!
//! Detects the type of a catalog source from its connection properties and
//! derives the properties the virtualization engine needs to register it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Known data source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Another virtualization engine instance
    Teiid,
    /// PostgreSQL
    Postgresql,
    /// MySQL
    Mysql,
    /// MariaDB
    Mariadb,
    /// Microsoft SQL Server
    Sqlserver,
    /// Oracle
    Oracle,
    /// MongoDB
    Mongodb,
    /// Anything not recognised
    #[default]
    Unknown,
}

impl SourceType {
    /// All recognised types, in detection order
    pub const KNOWN: [SourceType; 7] = [
        Self::Teiid,
        Self::Postgresql,
        Self::Mysql,
        Self::Mariadb,
        Self::Sqlserver,
        Self::Oracle,
        Self::Mongodb,
    ];

    /// Detect the type from connection properties (`url`, or `jdbc-url`)
    pub fn detect(properties: &BTreeMap<String, String>) -> Self {
        let url = match properties.get("url").or_else(|| properties.get("jdbc-url")) {
            Some(url) => url,
            None => return Self::Unknown,
        };

        Self::KNOWN
            .into_iter()
            .find(|t| url.starts_with(t.url_prefix()))
            .unwrap_or(Self::Unknown)
    }

    /// URL prefix identifying this type
    pub fn url_prefix(&self) -> &'static str {
        match self {
            Self::Teiid => "jdbc:teiid:",
            Self::Postgresql => "jdbc:postgresql:",
            Self::Mysql => "jdbc:mysql:",
            Self::Mariadb => "jdbc:mariadb:",
            Self::Sqlserver => "jdbc:sqlserver:",
            Self::Oracle => "jdbc:oracle:",
            Self::Mongodb => "mongodb://",
            Self::Unknown => "",
        }
    }

    /// Type name, also used as the driver name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Teiid => "teiid",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
            Self::Mongodb => "mongodb",
            Self::Unknown => "unknown",
        }
    }

    /// Translator the engine uses for this type
    pub fn translator_name(&self) -> &'static str {
        match self {
            Self::Teiid => "teiid",
            Self::Postgresql => "postgresql",
            Self::Mysql | Self::Mariadb => "mysql5",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
            Self::Mongodb => "mongodb",
            Self::Unknown => "jdbc-ansi",
        }
    }

    /// Whether sources of this type are reached over JDBC
    pub fn is_jdbc(&self) -> bool {
        !matches!(self, Self::Mongodb)
    }

    /// Properties used to register a source with the engine
    pub fn internal_properties(
        &self,
        name: &str,
        properties: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("jndi-name".to_string(), name.to_string());
        props.insert("driver-name".to_string(), self.name().to_string());
        props.insert("display-name".to_string(), name.to_string());

        for key in ["url", "user", "password", "schema"] {
            if let Some(value) = properties.get(key) {
                props.insert(key.to_string(), value.clone());
            }
        }
        props
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
