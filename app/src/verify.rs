use std::collections::BTreeMap;

use json::JsonValue;
use log::debug;

use crate::error::{Error, Result};

/// Opaque key/value payload forwarded verbatim to the verification authority.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credential(BTreeMap<String, String>);

impl Credential {
    /// Builds a credential from a raw query string such as `certContent=..&certSign=..`.
    ///
    /// Later duplicates of a key replace earlier ones.
    pub fn from_query(query: &str) -> Self {
        let fields = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Credential(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> String {
        let mut body = JsonValue::new_object();
        for (key, value) in &self.0 {
            body[key.as_str()] = value.as_str().into();
        }
        body.dump()
    }
}

impl<K, V> FromIterator<(K, V)> for Credential
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Credential(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VerificationOutcome {
    pub succeed: bool,
}

impl VerificationOutcome {
    /// Parses `{"succeed": <bool>, ...}`. Anything else is an error, never a denial.
    pub fn parse(body: &str) -> Result<Self> {
        let parsed = json::parse(body).map_err(|err| Error::VerificationParse(err.to_string()))?;
        match parsed["succeed"].as_bool() {
            Some(succeed) => Ok(VerificationOutcome { succeed }),
            None => Err(Error::VerificationParse(format!(
                "missing boolean \"succeed\" in {}",
                body.trim()
            ))),
        }
    }
}

/// One verification round-trip. No retries.
pub trait Verifier: Send + Sync {
    fn verify(&self, credential: &Credential) -> Result<VerificationOutcome>;
}

/// Posts the credential as JSON to the verification authority.
pub struct HttpVerifier {
    agent: ureq::Agent,
    url: String,
}

impl HttpVerifier {
    pub fn new(url: impl Into<String>) -> Self {
        HttpVerifier {
            agent: ureq::AgentBuilder::new().build(),
            url: url.into(),
        }
    }
}

impl Verifier for HttpVerifier {
    fn verify(&self, credential: &Credential) -> Result<VerificationOutcome> {
        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&credential.to_json())
        {
            Ok(response) => response,
            // The authority may answer with an error status and still carry a verdict.
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(Error::VerificationTransport(err.to_string())),
        };
        let body = response
            .into_string()
            .map_err(|err| Error::VerificationTransport(err.to_string()))?;
        debug!("verification response: {}", body.trim());
        VerificationOutcome::parse(&body)
    }
}
