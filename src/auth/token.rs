//! Encoding and decoding of the signed bearer tokens used for API access.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::Error;

/// How long an access token stays valid after being issued.
pub const DEFAULT_ACCESS_TOKEN_DURATION: Duration = Duration::minutes(90);

/// The claims carried by an access token.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// The email address of the authenticated user.
    pub sub: String,

    /// The Unix timestamp at which the token was issued.
    pub iat: usize,

    /// The Unix timestamp at which the token expires.
    pub exp: usize,
}

/// Create a signed access token for the user with `email` that expires after
/// [DEFAULT_ACCESS_TOKEN_DURATION].
///
/// # Errors
/// This function will return an [Error::TokenCreation] if the token could
/// not be signed.
pub fn issue_token(email: &str, encoding_key: &EncodingKey) -> Result<String, Error> {
    let issued_at = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: email.to_owned(),
        iat: issued_at.unix_timestamp() as usize,
        exp: (issued_at + DEFAULT_ACCESS_TOKEN_DURATION).unix_timestamp() as usize,
    };

    jsonwebtoken::encode(&Header::default(), &claims, encoding_key).map_err(|error| {
        tracing::error!("could not sign an auth token: {error}");
        Error::TokenCreation
    })
}

/// Decode and validate a signed access token, returning its claims.
///
/// # Errors
/// This function will return an [Error::InvalidToken] if the signature does
/// not match, the token is malformed or the token has expired.
pub fn decode_token(token: &str, decoding_key: &DecodingKey) -> Result<Claims, Error> {
    jsonwebtoken::decode::<Claims>(token, decoding_key, &Validation::new(Algorithm::HS256))
        .map(|token_data| token_data.claims)
        .map_err(|_| Error::InvalidToken)
}

#[cfg(test)]
mod token_tests {
    use jsonwebtoken::{DecodingKey, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    use crate::Error;

    use super::{Claims, decode_token, issue_token};

    const SECRET: &[u8] = b"the-quick-brown-fox";

    #[test]
    fn issue_and_decode_round_trip() {
        let encoding_key = EncodingKey::from_secret(SECRET);
        let decoding_key = DecodingKey::from_secret(SECRET);

        let token =
            issue_token("averagejoe@example.com", &encoding_key).expect("Could not issue token");
        let claims = decode_token(&token, &decoding_key).expect("Could not decode token");

        assert_eq!(claims.sub, "averagejoe@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn decode_fails_with_wrong_secret() {
        let encoding_key = EncodingKey::from_secret(SECRET);
        let wrong_key = DecodingKey::from_secret(b"someotherkey");

        let token =
            issue_token("averagejoe@example.com", &encoding_key).expect("Could not issue token");
        let result = decode_token(&token, &wrong_key);

        assert_eq!(result, Err(Error::InvalidToken));
    }

    #[test]
    fn decode_fails_with_expired_token() {
        let encoding_key = EncodingKey::from_secret(SECRET);
        let decoding_key = DecodingKey::from_secret(SECRET);
        // Two hours in the past puts the token well outside the default
        // validation leeway.
        let issued_at = OffsetDateTime::now_utc() - Duration::hours(3);
        let claims = Claims {
            sub: "averagejoe@example.com".to_owned(),
            iat: issued_at.unix_timestamp() as usize,
            exp: (issued_at + Duration::hours(1)).unix_timestamp() as usize,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let result = decode_token(&token, &decoding_key);

        assert_eq!(result, Err(Error::InvalidToken));
    }

    #[test]
    fn decode_fails_with_garbage() {
        let decoding_key = DecodingKey::from_secret(SECRET);

        let result = decode_token("not.a.token", &decoding_key);

        assert_eq!(result, Err(Error::InvalidToken));
    }
}
