//! Extraction of `code`/`state`/`error` from a callback URL pasted by an operator.

use url::Url;

use crate::error::AuthError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
    pub error: String,
}

/// Parse a redirect URL in any of the shapes operators paste.
///
/// Lookup order is query string, then a query-style fragment, then a
/// `code#state` pair packed into one value.
pub fn parse_callback_url(input: &str) -> Result<CallbackParams, AuthError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidInput("callback URL is required".to_string()));
    }

    let url = Url::parse(&normalize(trimmed)?)
        .map_err(|e| AuthError::InvalidInput(format!("invalid callback URL: {}", e)))?;

    let mut params = CallbackParams::default();
    let mut error_description = String::new();
    absorb_pairs(
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())),
        &mut params,
        &mut error_description,
    );

    let fragment = url.fragment().unwrap_or_default();
    if !fragment.is_empty() {
        absorb_pairs(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
            &mut params,
            &mut error_description,
        );
    }

    if params.error.is_empty() {
        params.error = error_description;
    }

    if !params.code.is_empty() && params.state.is_empty() {
        if let Some((code, state)) = params.code.split_once('#') {
            params.state = state.trim().to_string();
            params.code = code.trim().to_string();
        } else if !fragment.is_empty() && !fragment.contains('=') {
            // `code=ABC#XYZ`: the URL parser already split the state off as the fragment
            params.state = fragment.trim().to_string();
        }
    }

    if params.code.is_empty() && params.error.is_empty() {
        return Err(AuthError::InvalidInput(
            "callback URL missing authorization code".to_string(),
        ));
    }

    Ok(params)
}

fn normalize(input: &str) -> Result<String, AuthError> {
    if input.contains("://") {
        return Ok(input.to_string());
    }
    if input.starts_with('?') || input.starts_with('#') {
        return Ok(format!("http://localhost/{}", input));
    }

    let head = input.split(['?', '#']).next().unwrap_or_default();
    if head.contains('=') {
        return Ok(format!("http://localhost/?{}", input));
    }
    if input.contains(['/', '?', '#', ':']) {
        return Ok(format!("http://{}", input));
    }

    Err(AuthError::InvalidInput("invalid callback URL".to_string()))
}

/// First non-empty value for each key wins
fn absorb_pairs(
    pairs: impl Iterator<Item = (String, String)>,
    params: &mut CallbackParams,
    error_description: &mut String,
) {
    for (key, value) in pairs {
        let value = value.trim();
        let slot = match key.as_str() {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            "error_description" => &mut *error_description,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = value.to_string();
        }
    }
}
