/// Errors surfaced by the client.
///
/// Send and upload operations absorb their own failures and return `None`;
/// everything else propagates one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// App id or secret is empty; raised before any network call is made.
    #[error("app id or secret is not configured")]
    MissingCredentials,

    #[error("network error: {0}")]
    Network(String),

    /// The token endpoint rejected the credential exchange.
    #[error("auth error: {0}")]
    Auth(String),

    /// The platform envelope carried a non-zero status code.
    #[error("api error (code {code}): {msg}")]
    Api { code: i64, msg: String },

    /// A response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
