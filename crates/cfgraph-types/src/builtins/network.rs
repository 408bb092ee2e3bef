//! Network-flavored types: `url`, `email`, `port`

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{number, parse_settings, string};
use crate::data_type::DataType;
use crate::error::{Result, TypeError, ValidationError};
use crate::type_ref::TypeFactory;

pub const URL_LABEL: &str = "url";
pub const EMAIL_LABEL: &str = "email";
pub const PORT_LABEL: &str = "port";

// scheme://[userinfo@]host[:port][/path?query#fragment]
const URL_PATTERN: &str =
    r"^[a-zA-Z][a-zA-Z0-9+.-]*://(?:[^/?#@\s]+@)?([^/?#:\s]+)(?::\d+)?(?:[/?#]\S*)?$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn compile(type_label: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TypeError::FactoryFailed {
        type_label: type_label.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UrlSettings {
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default)]
    pub keep_trailing_slash: bool,
}

pub fn url_factory() -> TypeFactory {
    TypeFactory::new(URL_LABEL, build_url)
}

pub fn build_url(settings: &Value) -> Result<DataType> {
    let parsed: UrlSettings = parse_settings(URL_LABEL, settings)?;
    let keep_slash = parsed.keep_trailing_slash;
    let url_re = compile(URL_LABEL, URL_PATTERN)?;
    Ok(DataType::builder(URL_LABEL)
        .extends(string::factory().instantiate(&Value::Null)?)
        .settings(settings.clone())
        .summary("A URL")
        .validate(move |value, _| {
            validate_url(value, &url_re, parsed.allowed_domains.as_deref())
        })
        .normalize(move |value, _| match value {
            Value::String(s) if !keep_slash && s.ends_with('/') => {
                Value::String(s.trim_end_matches('/').to_string())
            }
            other => other,
        })
        .build())
}

fn validate_url(
    value: &Value,
    url_re: &Regex,
    allowed_domains: Option<&[String]>,
) -> std::result::Result<(), Vec<ValidationError>> {
    // non-strings are already reported by the string parent
    let Some(s) = value.as_str() else {
        return Ok(());
    };
    let Some(caps) = url_re.captures(s) else {
        return Err(vec![
            ValidationError::new("Invalid URL").with_tip("URLs must include a scheme, e.g. https://"),
        ]);
    };
    if let (Some(domains), Some(host)) = (allowed_domains, caps.get(1)) {
        let host = host.as_str().to_lowercase();
        let allowed = domains.iter().any(|d| {
            let d = d.to_lowercase();
            host == d || host.ends_with(&format!(".{d}"))
        });
        if !allowed {
            return Err(vec![ValidationError::new(format!(
                "Domain \"{host}\" is not in the allowed list"
            ))]);
        }
    }
    Ok(())
}

pub fn email_factory() -> TypeFactory {
    TypeFactory::new(EMAIL_LABEL, build_email)
}

pub fn build_email(settings: &Value) -> Result<DataType> {
    let email_re = compile(EMAIL_LABEL, EMAIL_PATTERN)?;
    Ok(DataType::builder(EMAIL_LABEL)
        .extends(string::factory().instantiate(&Value::Null)?)
        .settings(settings.clone())
        .summary("An email address")
        .validate(move |value, _| match value.as_str() {
            Some(s) if !email_re.is_match(s) => {
                Err(vec![ValidationError::new("Invalid email address")])
            }
            _ => Ok(()),
        })
        .normalize(|value, _| match value {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other,
        })
        .build())
}

pub fn port_factory() -> TypeFactory {
    TypeFactory::new(PORT_LABEL, build_port)
}

pub fn build_port(settings: &Value) -> Result<DataType> {
    let parent = number::factory().instantiate(&json!({
        "min": 0,
        "max": 65535,
        "isInt": true,
    }))?;
    Ok(DataType::builder(PORT_LABEL)
        .extends(parent)
        .settings(settings.clone())
        .summary("A TCP/UDP port number")
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com", true)]
    #[case("http://user@localhost:8080/path?q=1", true)]
    #[case("postgres://db.internal:5432/app", true)]
    #[case("example.com", false)]
    #[case("https://", false)]
    fn test_url_validation(#[case] input: &str, #[case] ok: bool) {
        let t = build_url(&Value::Null).unwrap();
        assert_eq!(t.validate(&json!(input)).is_ok(), ok, "{input}");
    }

    #[test]
    fn test_url_allowed_domains() {
        let t = build_url(&json!({"allowedDomains": ["example.com"]})).unwrap();
        assert!(t.validate(&json!("https://api.example.com/v1")).is_ok());
        assert!(t.validate(&json!("https://evil.com")).is_err());
    }

    #[test]
    fn test_url_normalize_strips_trailing_slash() {
        let t = build_url(&Value::Null).unwrap();
        assert_eq!(t.normalize(json!("https://a.io/")), json!("https://a.io"));
    }

    #[test]
    fn test_url_extends_string() {
        let t = build_url(&Value::Null).unwrap();
        assert!(t.extends(&string::build(&Value::Null).unwrap()));
        let errors = t.validate(&json!(5)).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_email() {
        let t = build_email(&Value::Null).unwrap();
        assert!(t.validate(&json!("me@example.com")).is_ok());
        assert!(t.validate(&json!("not-an-email")).is_err());
        assert_eq!(t.normalize(json!("Me@Example.COM")), json!("me@example.com"));
    }

    #[rstest]
    #[case(json!(8080), true)]
    #[case(json!(0), true)]
    #[case(json!(65536), false)]
    #[case(json!(80.5), false)]
    fn test_port(#[case] value: Value, #[case] ok: bool) {
        let t = build_port(&Value::Null).unwrap();
        assert_eq!(t.validate(&value).is_ok(), ok);
    }

    #[test]
    fn test_port_coerces_strings() {
        let t = build_port(&Value::Null).unwrap();
        assert_eq!(t.coerce(json!("3000")).unwrap(), json!(3000));
    }
}
