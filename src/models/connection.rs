use serde::{Deserialize, Serialize};

/// Raw connection parameters as supplied by a caller.
///
/// Built per request and never cached; the connection factory validates and
/// normalizes it into a store handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: PortValue,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Ports arrive either as JSON numbers or as form strings.
///
/// Any JSON number is accepted here so that negative or fractional ports
/// reach the connection factory and fail there as configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(serde_json::Number),
    Text(String),
}

impl Default for PortValue {
    fn default() -> Self {
        PortValue::Text(String::new())
    }
}

impl From<u16> for PortValue {
    fn from(port: u16) -> Self {
        PortValue::Number(port.into())
    }
}

impl PortValue {
    /// Coerce to a TCP port. `None` for blank, non-numeric, zero or out-of-range input.
    pub fn as_port(&self) -> Option<u16> {
        let raw = match self {
            PortValue::Number(n) => n.as_u64()?,
            PortValue::Text(s) => s.trim().parse::<u64>().ok()?,
        };
        u16::try_from(raw).ok().filter(|p| *p != 0)
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, PortValue::Text(s) if s.trim().is_empty())
    }
}

impl ConnectionSpec {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            username: None,
            password: password.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Username after trimming, falling back to `default`.
    pub fn effective_username(&self) -> String {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("default")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_accepts_number_and_string() {
        let spec: ConnectionSpec =
            serde_json::from_str(r#"{"host":"h","port":8443,"password":"p"}"#).unwrap();
        assert_eq!(spec.port.as_port(), Some(8443));

        let spec: ConnectionSpec =
            serde_json::from_str(r#"{"host":"h","port":" 8123 ","password":"p"}"#).unwrap();
        assert_eq!(spec.port.as_port(), Some(8123));
    }

    #[test]
    fn test_invalid_ports() {
        assert_eq!(PortValue::Text("abc".into()).as_port(), None);
        assert_eq!(PortValue::Number(0.into()).as_port(), None);
        assert_eq!(PortValue::Number(70000.into()).as_port(), None);
        assert!(PortValue::default().is_blank());
    }

    #[test]
    fn test_negative_and_fractional_ports_parse_but_are_invalid() {
        for raw in [r#"-1"#, r#"8123.5"#, r#"1e3"#] {
            let body = format!(r#"{{"host":"h","port":{},"password":"p"}}"#, raw);
            let spec: ConnectionSpec = serde_json::from_str(&body).unwrap();
            assert_eq!(spec.port.as_port(), None, "port {}", raw);
            assert!(!spec.port.is_blank());
        }
    }

    #[test]
    fn test_username_defaults() {
        let spec = ConnectionSpec::new("h", 8123, "p");
        assert_eq!(spec.effective_username(), "default");
        let spec = spec.with_username("  ");
        assert_eq!(spec.effective_username(), "default");
        let spec = ConnectionSpec::new("h", 8123, "p").with_username(" analyst ");
        assert_eq!(spec.effective_username(), "analyst");
    }
}
