use std::fmt;

use aliri_braid::braid;

/// The stable unique identifier of an authenticated wiki user
///
/// Extracted from the session principal's unique-identifier claim and used
/// to scope cache entries. Treated as an opaque, provider-guaranteed value.
#[braid(serde)]
pub struct SubjectId;

/// An OAuth2 client ID
#[braid(serde)]
pub struct ClientId;

/// An OAuth2 client secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

/// A bearer access token for the wiki's REST API
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

/// A refresh token, exchanged exactly once for the next token pair
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

macro_rules! concealed {
    ($ty:ty, $hidden:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }
    };
}

concealed!(ClientSecretRef, "CLIENT SECRET");
concealed!(AccessTokenRef, "ACCESS TOKEN");
concealed!(RefreshTokenRef, "REFRESH TOKEN");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_concealed_in_debug_and_display() {
        let secret = RefreshToken::from_static("very-secret-value");
        assert_eq!(format!("{secret:?}"), "***REFRESH TOKEN***");
        assert_eq!(secret.to_string(), "***REFRESH TOKEN***");
        assert_eq!(secret.as_str(), "very-secret-value");
    }

    #[test]
    fn subject_ids_display_verbatim() {
        let sub = SubjectId::from_static("12345");
        assert_eq!(sub.to_string(), "12345");
    }
}
