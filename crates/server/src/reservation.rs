use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use slotwatch_core::config::SourceConfig;
use slotwatch_core::domain::slot::{Slot, SlotFields};
use slotwatch_core::{Credential, SearchFilter, SlotSource, SourceError};
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/api/v1/user/login";
pub const SLOTS_PATH: &str = "/api/v1/wedding/rsv_slot";

const SITE_ORIGIN: &str = "https://apelgamo.com";
const SITE_REFERER: &str = "https://apelgamo.com/";
const BODY_EXCERPT_CHARS: usize = 500;

/// HTTP client for the wedding-hall reservation API.
pub struct ReservationClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: SecretString,
}

impl ReservationClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|error| SourceError::Request {
                endpoint: "client".to_owned(),
                message: format!("invalid user agent: {error}"),
            })?,
        );
        headers.insert(ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| SourceError::Request {
                endpoint: "client".to_owned(),
                message: error.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<(StatusCode, String), SourceError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|error| request_error(path, &error))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| request_error(path, &error))?;
        Ok((status, text))
    }
}

#[async_trait]
impl SlotSource for ReservationClient {
    async fn authenticate(&self) -> Result<Credential, SourceError> {
        let request = LoginRequest {
            username: &self.username,
            password: self.password.expose_secret(),
        };
        let (status, body) = self.post(LOGIN_PATH, &request).await?;
        if status != StatusCode::OK {
            return Err(status_error(LOGIN_PATH, status, &body));
        }

        let credential = parse_login_response(&body)?;
        info!(
            event_name = "source.login.succeeded",
            username = %self.username,
            grant_type = credential.grant_type(),
            "reservation source login succeeded"
        );
        Ok(credential)
    }

    async fn fetch_slots(&self, filter: &SearchFilter) -> Result<Vec<Slot>, SourceError> {
        let request = SlotSearchRequest::from_filter(filter);
        let (status, body) = self.post(SLOTS_PATH, &request).await?;
        if !status.is_success() {
            return Err(status_error(SLOTS_PATH, status, &body));
        }

        let slots = parse_slots_response(&body)?;
        debug!(event_name = "source.search.succeeded", slot_count = slots.len(), "slots fetched");
        Ok(slots)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct SlotSearchRequest<'a> {
    brand: &'a str,
    branch: &'a str,
    hall: &'a str,
    st_dt: &'a str,
    ed_dt: &'a str,
    time: &'a str,
    yoil: &'a str,
    min_deposit: String,
    max_deposit: String,
}

impl<'a> SlotSearchRequest<'a> {
    fn from_filter(filter: &'a SearchFilter) -> Self {
        Self {
            brand: &filter.brand,
            branch: &filter.branch,
            hall: &filter.hall,
            st_dt: &filter.start_date,
            ed_dt: &filter.end_date,
            time: &filter.time,
            yoil: &filter.weekday,
            min_deposit: filter.min_deposit().to_string(),
            max_deposit: filter.max_deposit().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "jwtToken")]
    jwt_token: Option<JwtToken>,
}

#[derive(Debug, Deserialize)]
struct JwtToken {
    #[serde(rename = "grantType")]
    grant_type: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotsResponse {
    data: Vec<SlotFields>,
}

fn parse_login_response(body: &str) -> Result<Credential, SourceError> {
    let response: LoginResponse = serde_json::from_str(body).map_err(|error| {
        SourceError::Decode { endpoint: LOGIN_PATH.to_owned(), message: error.to_string() }
    })?;

    let token = response.data.and_then(|data| data.jwt_token);
    match token {
        Some(JwtToken { grant_type: Some(grant_type), access_token: Some(access_token) }) => {
            Ok(Credential::new(grant_type, access_token))
        }
        _ => Err(SourceError::Authentication(
            "login response is missing data.jwtToken.grantType or accessToken".to_owned(),
        )),
    }
}

fn parse_slots_response(body: &str) -> Result<Vec<Slot>, SourceError> {
    let response: SlotsResponse = serde_json::from_str(body).map_err(|error| {
        SourceError::Decode { endpoint: SLOTS_PATH.to_owned(), message: error.to_string() }
    })?;

    response
        .data
        .into_iter()
        .map(|fields| Slot::try_from(fields).map_err(SourceError::from))
        .collect()
}

fn request_error(endpoint: &str, error: &reqwest::Error) -> SourceError {
    SourceError::Request { endpoint: endpoint.to_owned(), message: error.to_string() }
}

fn status_error(endpoint: &str, status: StatusCode, body: &str) -> SourceError {
    SourceError::Status {
        endpoint: endpoint.to_owned(),
        status: status.as_u16(),
        body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use slotwatch_core::{SearchFilter, SlotValidationError, SourceError};

    use super::{parse_login_response, parse_slots_response, SlotSearchRequest, LOGIN_PATH};

    #[test]
    fn login_response_yields_redacted_credential() {
        let body = r#"{"data":{"jwtToken":{"grantType":"Bearer","accessToken":"abc.def"}}}"#;
        let credential = parse_login_response(body).expect("credential");
        assert_eq!(credential.grant_type(), "Bearer");
        assert!(format!("{credential:?}").contains("<redacted>"));
    }

    #[test]
    fn login_response_without_token_is_an_authentication_error() {
        let error = parse_login_response(r#"{"data":{"jwtToken":{"grantType":"Bearer"}}}"#)
            .expect_err("missing access token");
        assert!(matches!(error, SourceError::Authentication(_)));

        let error = parse_login_response(r#"{"message":"bad credentials"}"#)
            .expect_err("missing data");
        assert!(matches!(error, SourceError::Authentication(_)));
    }

    #[test]
    fn malformed_login_body_is_a_decode_error() {
        let error = parse_login_response("<html>gateway timeout</html>").expect_err("not json");
        assert!(matches!(error, SourceError::Decode { ref endpoint, .. } if endpoint == LOGIN_PATH));
    }

    #[test]
    fn slots_response_preserves_source_order() {
        let body = r#"{"data":[
            {"WEDDING_DT":"20251101","W_YOIL":"토요일","W_TIME":"11:00","HALL_NM":"A홀",
             "RENT_DC":"1000000","EAT_DC":"65000","PER_DC":"10","HALL_IMG_CD":"x"},
            {"WEDDING_DT":"20251102","W_YOIL":"일요일","W_TIME":"13:30","HALL_NM":"B홀",
             "RENT_DC":"0","EAT_DC":"0","PER_DC":"0","HALL_IMG_CD":"y"}
        ]}"#;

        let slots = parse_slots_response(body).expect("slots");

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].label(), "11/01(토) 11:00 A홀");
        assert_eq!(slots[1].label(), "11/02(일) 13:30 B홀");
    }

    #[test]
    fn slot_without_label_fields_fails_the_fetch() {
        let body = r#"{"data":[{"WEDDING_DT":"20251101","HALL_IMG_CD":"x"}]}"#;
        let error = parse_slots_response(body).expect_err("invalid slot");
        assert!(matches!(error, SourceError::Validation(SlotValidationError::MissingField(_))));
    }

    #[test]
    fn search_request_carries_fixed_deposit_bounds() {
        let filter = SearchFilter {
            brand: "AG".to_owned(),
            branch: "001".to_owned(),
            hall: "H1".to_owned(),
            start_date: "20251101".to_owned(),
            end_date: "20251130".to_owned(),
            weekday: "7".to_owned(),
            time: "".to_owned(),
        };

        let value = serde_json::to_value(SlotSearchRequest::from_filter(&filter)).expect("json");

        assert_eq!(value["st_dt"], "20251101");
        assert_eq!(value["yoil"], "7");
        assert_eq!(value["min_deposit"], "100");
        assert_eq!(value["max_deposit"], "400");
    }
}
