use anyhow::Result;
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;

pub(crate) const MODE_ENV: &str = "KATA_MODE";
pub(crate) const UPLOAD_SECRET_ENV: &str = "KATA_UPLOAD_SECRET";

static LOCALE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(-[A-Z]{2})?$").expect("valid locale regex"));

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    Development,
    Production,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Development => "development",
            ExecutionMode::Production => "production",
        }
    }

    /// Per-call log lines are a development aid only.
    pub const fn logs_calls(self) -> bool {
        matches!(self, ExecutionMode::Development)
    }

    /// `--mode` wins; otherwise `KATA_MODE`; otherwise development.
    pub fn resolve(flag: Option<ExecutionMode>) -> Result<Self> {
        if let Some(mode) = flag {
            return Ok(mode);
        }
        match env::var(MODE_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(ExecutionMode::Development),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(ExecutionMode::Development),
            "production" | "prod" => Ok(ExecutionMode::Production),
            other => anyhow::bail!("Unknown execution mode {other:?} (expected development|production)"),
        }
    }
}

/// Locales the cookie endpoint accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportedLocales {
    codes: Vec<String>,
}

impl SupportedLocales {
    pub fn parse(raw: &str) -> Result<Self> {
        let codes: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if codes.is_empty() {
            anyhow::bail!("At least one locale must be configured");
        }
        if let Some(bad) = codes.iter().find(|c| !LOCALE_CODE.is_match(c)) {
            anyhow::bail!("Invalid locale code {bad:?} (expected e.g. en or pt-BR)");
        }
        Ok(Self { codes })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}

impl Default for SupportedLocales {
    fn default() -> Self {
        Self {
            codes: vec!["en".to_string(), "de".to_string(), "fr".to_string()],
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    pub public: bool,
    pub mode: ExecutionMode,
    pub locales: SupportedLocales,
    pub upload_base_url: String,
    pub upload_secret: String,
    pub seed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_and_aliases() {
        assert_eq!(ExecutionMode::parse("PROD").unwrap(), ExecutionMode::Production);
        assert_eq!(ExecutionMode::parse(" dev ").unwrap(), ExecutionMode::Development);
        assert!(ExecutionMode::parse("staging").is_err());
        assert_eq!(
            ExecutionMode::resolve(Some(ExecutionMode::Production)).unwrap(),
            ExecutionMode::Production
        );
        assert!(!ExecutionMode::Production.logs_calls());
    }

    #[test]
    fn locales_are_validated() {
        let locales = SupportedLocales::parse("en, pt-BR,,de").unwrap();
        assert_eq!(locales.codes(), ["en", "pt-BR", "de"]);
        assert!(locales.contains("pt-BR"));
        assert!(!locales.contains("pt"));
        assert!(SupportedLocales::parse(" , ").is_err());
        assert!(SupportedLocales::parse("en,EN_us").is_err());
    }
}
