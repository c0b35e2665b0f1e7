use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment the service reports in health checks, alerts and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Dev,
    /// Functional acceptance testing.
    #[default]
    Fat,
    /// User acceptance testing.
    Uat,
    /// Production.
    Pro,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Fat => "fat",
            Self::Uat => "uat",
            Self::Pro => "pro",
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Pro
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "fat" => Ok(Self::Fat),
            "uat" => Ok(Self::Uat),
            "pro" | "prod" => Ok(Self::Pro),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("PRO".parse::<Environment>().unwrap(), Environment::Pro);
        assert_eq!(" dev ".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::Uat.to_string(), "uat");
    }

    #[test]
    fn test_default_is_fat() {
        assert_eq!(Environment::default(), Environment::Fat);
        assert!(!Environment::default().is_production());
    }
}
