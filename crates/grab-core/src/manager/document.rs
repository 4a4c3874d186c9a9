//! Response body parsers for `fetch_parsed`.

use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::transport::Response;

/// A type that can be built from a fully read response.
///
/// Plugins implement this for their own formats (an HTML tree, a feed, ...)
/// so the engine never depends on a particular parser.
pub trait Document: Sized {
    fn parse(response: Response) -> Result<Self, BoxError>;
}

impl Document for Response {
    fn parse(response: Response) -> Result<Self, BoxError> {
        Ok(response)
    }
}

/// UTF-8 text; invalid sequences are replaced.
impl Document for String {
    fn parse(response: Response) -> Result<Self, BoxError> {
        Ok(String::from_utf8(response.body)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }
}

impl Document for serde_json::Value {
    fn parse(response: Response) -> Result<Self, BoxError> {
        Ok(serde_json::from_slice(&response.body)?)
    }
}

/// Typed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> Document for Json<T> {
    fn parse(response: Response) -> Result<Self, BoxError> {
        Ok(Json(serde_json::from_slice(&response.body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn response(body: &[u8]) -> Response {
        Response {
            body: body.to_vec(),
            ..Response::default()
        }
    }

    #[test]
    fn text_is_lossy() {
        let s = String::parse(response(b"ok \xff")).unwrap();
        assert_eq!(s, "ok \u{fffd}");
    }

    #[test]
    fn typed_json() {
        #[derive(Deserialize)]
        struct Page {
            items: Vec<u32>,
        }
        let Json(page) = Json::<Page>::parse(response(br#"{"items":[1,2]}"#)).unwrap();
        assert_eq!(page.items, vec![1, 2]);
        assert!(serde_json::Value::parse(response(b"<html>")).is_err());
    }
}
