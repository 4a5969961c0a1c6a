use serde::{Deserialize, Serialize};

/// Represents ways to locate an element in the remote document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Selector {
    /// Select using a CSS selector
    Css(String),
    /// Select by element id attribute
    Id(String),
    /// Select by form control `name` attribute
    Name(String),
    /// Select using an XPath expression
    XPath(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// Builds the JavaScript expression that evaluates to the matching
    /// element, or `null` when nothing matches.
    pub fn to_js_lookup(&self) -> Result<String, crate::AutomationError> {
        let quoted = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
        match self {
            Selector::Css(css) => Ok(format!("document.querySelector({})", quoted(css))),
            Selector::Id(id) => Ok(format!("document.getElementById({})", quoted(id))),
            Selector::Name(name) => Ok(format!(
                "document.querySelector({})",
                quoted(&format!("[name=\"{}\"]", name.replace('"', "\\\"")))
            )),
            Selector::XPath(xpath) => Ok(format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                quoted(xpath)
            )),
            Selector::Invalid(reason) => {
                Err(crate::AutomationError::InvalidSelector(reason.clone()))
            }
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{s}"),
            Selector::Id(s) => write!(f, "id:{s}"),
            Selector::Name(s) => write!(f, "name:{s}"),
            Selector::XPath(s) => write!(f, "xpath:{s}"),
            Selector::Invalid(reason) => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("css:") => non_empty(&s[4..], Selector::Css),
            _ if lower.starts_with("id:") => non_empty(&s[3..], Selector::Id),
            _ if lower.starts_with("name:") => non_empty(&s[5..], Selector::Name),
            _ if lower.starts_with("xpath:") => non_empty(&s[6..], Selector::XPath),
            _ if s.starts_with("//") || s.starts_with("(//") => Selector::XPath(s.to_string()),
            // Plain `#id` with no combinators maps to an id lookup, which also
            // tolerates ids that are not valid CSS identifiers.
            _ if s.starts_with('#')
                && s.len() > 1
                && !s[1..].contains(|c: char| c.is_whitespace() || ">+~.[:#,".contains(c)) =>
            {
                Selector::Id(s[1..].to_string())
            }
            _ => Selector::Css(s.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

fn non_empty(rest: &str, make: fn(String) -> Selector) -> Selector {
    let rest = rest.trim();
    if rest.is_empty() {
        Selector::Invalid("selector prefix without a value".to_string())
    } else {
        make(rest.to_string())
    }
}

#[cfg(test)]
mod selector_tests {
    use super::*;

    #[test]
    fn test_hash_id_selector() {
        let selector = Selector::from("#ctl00_cphBody_txtPropertyZip");
        assert_eq!(
            selector,
            Selector::Id("ctl00_cphBody_txtPropertyZip".to_string())
        );
    }

    #[test]
    fn test_hash_with_combinator_stays_css() {
        let selector = Selector::from("#form > input.zip");
        assert_eq!(selector, Selector::Css("#form > input.zip".to_string()));
    }

    #[test]
    fn test_prefixed_selectors() {
        assert_eq!(
            Selector::from("name:ctl00$cphBody$txtLoanNumber"),
            Selector::Name("ctl00$cphBody$txtLoanNumber".to_string())
        );
        assert_eq!(
            Selector::from("xpath://span[@class='fee']"),
            Selector::XPath("//span[@class='fee']".to_string())
        );
        assert_eq!(
            Selector::from("CSS:select[id$=drpLoanType]"),
            Selector::Css("select[id$=drpLoanType]".to_string())
        );
    }

    #[test]
    fn test_bare_xpath() {
        assert_eq!(
            Selector::from("//input[@type='submit']"),
            Selector::XPath("//input[@type='submit']".to_string())
        );
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(matches!(Selector::from("   "), Selector::Invalid(_)));
        assert!(matches!(Selector::from("id:"), Selector::Invalid(_)));
        assert!(Selector::from("css: ").to_js_lookup().is_err());
    }

    #[test]
    fn test_js_lookup_escapes_quotes() {
        let js = Selector::Css("input[value=\"a\"]".to_string())
            .to_js_lookup()
            .unwrap();
        assert_eq!(js, r#"document.querySelector("input[value=\"a\"]")"#);
    }

    #[test]
    fn test_display_round_trips_through_from() {
        let original = Selector::Id("lblFee".to_string());
        assert_eq!(Selector::from(original.to_string()), original);
    }
}
