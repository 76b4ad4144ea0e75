//! Authorization response encoding: query, fragment, form-post and the
//! JARM (`*.jwt`) variants.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use oxidp_model::{AuthorizationParameters, Client, Issuer};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::types::{resolve_response_mode, EffectiveResponseMode};

/// Lifetime of a JARM response JWT, seconds.
const JARM_LIFETIME_SECONDS: i64 = 10 * 60;

/// Encodes issued (or error) parameters back to the client.
pub(crate) struct RedirectBuilder<'a> {
    issuer: &'a Issuer,
    client: &'a Client,
    redirect_uri: Url,
    mode: EffectiveResponseMode,
    values: BTreeMap<String, String>,
}

impl<'a> RedirectBuilder<'a> {
    /// Resolves the effective response mode and prepares the builder.
    ///
    /// # Errors
    ///
    /// Fails on an unparseable redirect URI or an unknown
    /// response type/mode combination; both are internal errors at this
    /// point because validation ran earlier.
    pub(crate) fn new(
        issuer: &'a Issuer,
        client: &'a Client,
        params: &AuthorizationParameters,
        values: BTreeMap<String, String>,
    ) -> Result<Self, ProviderError> {
        let redirect_uri = Url::parse(&params.redirect_uri)
            .map_err(|e| ProviderError::Internal(format!("redirect_uri parse error: {e}")))?;
        let mode = resolve_response_mode(&params.response_type, &params.response_mode)
            .map_err(|e| ProviderError::Internal(e.to_string()))?;
        Ok(Self {
            issuer,
            client,
            redirect_uri,
            mode,
            values,
        })
    }

    /// Returns whether the response is an HTML page rather than a
    /// redirect URL.
    pub(crate) fn is_form_post(&self) -> bool {
        self.mode.is_form_post()
    }

    /// Produces the redirect URL or the self-submitting form document.
    pub(crate) async fn build(
        mut self,
        provider: &Provider,
        now: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        if self.mode.is_jwt() {
            // https://openid.net/specs/oauth-v2-jarm.html
            let mut claims = Map::new();
            for (k, v) in &self.values {
                if !v.is_empty() {
                    claims.insert(k.clone(), Value::String(v.clone()));
                }
            }
            claims.insert(
                "aud".to_string(),
                Value::String(self.client.identity.client_id.clone()),
            );
            claims.insert(
                "iss".to_string(),
                Value::String(self.issuer.meta.issuer.clone()),
            );
            claims.insert(
                "exp".to_string(),
                Value::Number(
                    (now + Duration::seconds(JARM_LIFETIME_SECONDS)).timestamp().into(),
                ),
            );
            let response = provider
                .sign_jwt(
                    self.issuer,
                    &claims,
                    &self.client.meta.authorization_signed_response_alg,
                )
                .await?;
            self.values = BTreeMap::from([("response".to_string(), response)]);
        }

        match self.mode {
            EffectiveResponseMode::Query | EffectiveResponseMode::QueryJwt => {
                {
                    let mut query = self.redirect_uri.query_pairs_mut();
                    for (k, v) in &self.values {
                        if !v.is_empty() {
                            query.append_pair(k, v);
                        }
                    }
                }
                Ok(self.redirect_uri.to_string())
            }
            EffectiveResponseMode::Fragment | EffectiveResponseMode::FragmentJwt => {
                let fragment: String = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(self.values.iter().filter(|(_, v)| !v.is_empty()))
                    .finish();
                self.redirect_uri.set_fragment(Some(&fragment));
                Ok(self.redirect_uri.to_string())
            }
            EffectiveResponseMode::FormPost | EffectiveResponseMode::FormPostJwt => {
                Ok(self.form_post_html())
            }
        }
    }

    fn form_post_html(&self) -> String {
        let mut inputs = String::new();
        for (k, v) in &self.values {
            if v.is_empty() {
                continue;
            }
            inputs.push_str(&format!(
                "      <input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
                escape_html(k),
                escape_html(v)
            ));
        }
        format!(
            "<!DOCTYPE html>\n<html>\n  <head><title>Submit This Form</title></head>\n  \
             <body onload=\"javascript:document.forms[0].submit()\">\n    \
             <form method=\"post\" action=\"{}\">\n{}    </form>\n  </body>\n</html>\n",
            escape_html(self.redirect_uri.as_str()),
            inputs
        )
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
