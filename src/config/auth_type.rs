use serde::de::{self, Visitor};
use serde::Deserializer;
use std::fmt;
use std::str::FromStr;

use crate::stun::auth::AuthenticationType;

/**
 * Authentication type parsing for the configuration layer.
 *
 * Unlike most settings this one does not fall back to a default on garbage
 * input: silently downgrading to unauthenticated operation on a typo would be
 * a security hole, so unknown values fail configuration loading.
 */

impl AuthenticationType {
    /**
     * Returns the string representation of the authentication type.
     *
     * @return A string slice representing the authentication type.
     */
    pub fn as_str(&self) -> &str {
        match *self {
            AuthenticationType::None => "none",
            AuthenticationType::ShortTerm => "short-term",
            AuthenticationType::LongTerm => "long-term",
        }
    }
}

impl FromStr for AuthenticationType {
    type Err = ();

    /**
     * Parse a string into an `AuthenticationType` enum.
     */
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AuthenticationType::None),
            "short-term" | "short_term" => Ok(AuthenticationType::ShortTerm),
            "long-term" | "long_term" => Ok(AuthenticationType::LongTerm),
            _ => Err(()),
        }
    }
}

/**
 * Deserialize the authentication type from the configuration file.
 */
pub fn deserialize<'de, D>(deserializer: D) -> Result<AuthenticationType, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_str(AuthTypeVisitor)
}

struct AuthTypeVisitor;

/**
 * Deserialize the authentication type from a string.
 */
impl<'de> Visitor<'de> for AuthTypeVisitor {
    type Value = AuthenticationType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string representing an authentication type")
    }

    fn visit_str<E>(self, value: &str) -> Result<AuthenticationType, E>
    where
        E: de::Error,
    {
        AuthenticationType::from_str(value)
            .map_err(|_| de::Error::unknown_variant(value, &["none", "short-term", "long-term"]))
    }
}
