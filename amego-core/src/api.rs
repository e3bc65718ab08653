//! Amego HTTP API client and response types.
use reqwest::{
    StatusCode, Url,
    blocking::{Client, Response},
    header::CONTENT_TYPE,
    redirect,
};
use base64ct::{Base64, Encoding};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    allowance::AllowanceRecord,
    config::{Config, DEFAULT_TIMEOUT},
    invoice::{InvoiceRecord, PrinterEncoding},
    sign::{SignedRequest, SigningError},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const ISSUE_PATH: &str = "json/f0401";
const ISSUE_WITH_NUMBER_PATH: &str = "json/f0401_custom";
const CANCEL_PATH: &str = "json/f0501";
const STATUS_PATH: &str = "json/invoice_status";
const DETAIL_PATH: &str = "json/invoice_query";
const TIME_PATH: &str = "json/time";
const INVOICE_LIST_PATH: &str = "json/invoice_list";
const INVOICE_FILE_PATH: &str = "json/invoice_file";
const INVOICE_PRINT_PATH: &str = "json/invoice_print";
const ALLOWANCE_ISSUE_PATH: &str = "json/g0401";
const ALLOWANCE_CANCEL_PATH: &str = "json/g0501";
const ALLOWANCE_STATUS_PATH: &str = "json/allowance_status";
const ALLOWANCE_DETAIL_PATH: &str = "json/allowance_query";
const ALLOWANCE_LIST_PATH: &str = "json/allowance_list";
const ALLOWANCE_FILE_PATH: &str = "json/allowance_file";
const ALLOWANCE_PRINT_PATH: &str = "json/allowance_print";
const BARCODE_PATH: &str = "json/barcode";
const BAN_QUERY_PATH: &str = "json/ban_query";
const LOTTERY_STATUS_PATH: &str = "json/lottery_status";
const LOTTERY_PRIZES_PATH: &str = "json/lottery_type";
const TRACK_INFO_PATH: &str = "json/track_all";
const TRACK_GET_PATH: &str = "json/track_get";
const TRACK_STATUS_PATH: &str = "json/track_status";

/// Errors returned by the API client. Nothing is retried; each variant is
/// the outcome of a single attempt.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// `body` is the lossy UTF-8 rendering for display; `raw` holds the bytes
    /// exactly as received.
    #[error("Invalid response body: {source}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
        body: String,
        raw: Vec<u8>,
    },
    #[error(transparent)]
    Serialization(#[from] SigningError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid file payload: {0}")]
    InvalidFile(String),
}

impl ApiError {
    /// HTTP status for [`ApiError::HttpStatus`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Raw response body, when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::HttpStatus { body, .. } | ApiError::ResponseParse { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Undecoded response bytes for [`ApiError::ResponseParse`].
    pub fn raw_body(&self) -> Option<&[u8]> {
        match self {
            ApiError::ResponseParse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(err) if err.is_timeout())
    }
}

/// Parsed gateway response.
///
/// The body is kept as an opaque JSON value; the gateway's `code`/`msg`
/// fields are exposed for display but not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: u16,
    value: serde_json::Value,
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    pub fn code(&self) -> Option<i64> {
        self.value.get("code").and_then(serde_json::Value::as_i64)
    }

    pub fn message(&self) -> Option<&str> {
        self.value.get("msg").and_then(serde_json::Value::as_str)
    }

    /// Decode the base64 `base64_data` field returned by the file endpoints.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidFile`] when the field is absent (typically a
    /// non-zero `code`) or is not valid base64.
    pub fn file_contents(&self) -> Result<Vec<u8>, ApiError> {
        let data = self
            .value
            .get("base64_data")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ApiError::InvalidFile(format!(
                    "no base64_data in response (code {:?}: {})",
                    self.code(),
                    self.message().unwrap_or_default()
                ))
            })?;
        Base64::decode_vec(data).map_err(|err| ApiError::InvalidFile(err.to_string()))
    }
}

/// Body of `GET json/time`. Older deployments name the field `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTime {
    #[serde(alias = "timestamp")]
    time: i64,
}

impl ServerTime {
    pub fn unix_seconds(&self) -> i64 {
        self.time
    }
}

/// One reading of the gateway clock and its offset from the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    pub time: i64,
    pub offset: i64,
}

/// Date range and paging for the list endpoints. Unset fields are omitted.
///
/// # Examples
/// ```rust
/// use amego_core::api::ListQuery;
/// use chrono::NaiveDate;
///
/// let query = ListQuery::default()
///     .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
///     .page(2, 50);
/// let json = serde_json::to_string(&query)?;
/// assert_eq!(json, r#"{"start_date":"2024-01-01","page":2,"page_size":50}"#);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
}

impl ListQuery {
    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }
}

#[derive(Debug, Serialize)]
struct NumberedInvoice<'a> {
    #[serde(flatten)]
    invoice: &'a InvoiceRecord,
    #[serde(rename = "InvoiceNumber")]
    invoice_number: &'a str,
}

#[derive(Debug, Serialize)]
struct CancelItem<'a> {
    #[serde(rename = "CancelInvoiceNumber")]
    cancel_invoice_number: &'a str,
}

#[derive(Debug, Serialize)]
struct InvoiceNumberItem<'a> {
    #[serde(rename = "InvoiceNumber")]
    invoice_number: &'a str,
}

#[derive(Debug, Serialize)]
struct CancelAllowanceItem<'a> {
    #[serde(rename = "CancelAllowanceNumber")]
    cancel_allowance_number: &'a str,
}

#[derive(Debug, Serialize)]
struct AllowanceNumberItem<'a> {
    #[serde(rename = "AllowanceNumber")]
    allowance_number: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PrintRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowance_number: Option<&'a str>,
    printer_type: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    printer_lang: Option<PrinterEncoding>,
}

#[derive(Debug, Serialize)]
struct BarcodeQuery<'a> {
    #[serde(rename = "Barcode")]
    barcode: &'a str,
}

#[derive(Debug, Serialize)]
struct BanItem<'a> {
    ban: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PeriodQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TrackRequest<'a> {
    count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    track_api_code: Option<&'a str>,
}

/// Sign and submit one invoice to `endpoint`.
///
/// The timestamp is taken once from the local clock and used for both the
/// signature and the `time` field.
///
/// # Errors
/// Returns [`ApiError`] for transport failures, non-success statuses,
/// unparseable bodies, or payloads that cannot be serialized.
pub fn submit(
    invoice: &InvoiceRecord,
    seller_tax_id: &str,
    app_key: &str,
    endpoint: &Url,
) -> Result<ApiResponse, ApiError> {
    if seller_tax_id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("seller tax id is empty".into()));
    }
    let client = build_http_client(DEFAULT_TIMEOUT)?;
    let request = SignedRequest::new(invoice, seller_tax_id, app_key, unix_timestamp(0))?;
    post_signed(&client, endpoint.clone(), &request)
}

/// Amego API client bound to one seller and app key.
///
/// # Examples
/// ```rust,no_run
/// use amego_core::api::AmegoClient;
/// use amego_core::config::Config;
///
/// let client = AmegoClient::new(Config::new("12345678", "app-key")?)?;
/// let status = client.invoice_status(&["AB12345678"])?;
/// println!("{}", status.value());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct AmegoClient {
    config: Config,
    client: Client,
}

// Public API
impl AmegoClient {
    /// Create a client using the provided configuration.
    ///
    /// # Errors
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let client = build_http_client(config.timeout())?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sign `payload` with the configured credentials and the current time.
    ///
    /// # Errors
    /// Returns [`ApiError::Serialization`] if the payload cannot be serialized.
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> Result<SignedRequest, ApiError> {
        let timestamp = unix_timestamp(self.config.time_offset());
        self.sign_at(payload, timestamp)
    }

    /// Sign `payload` with an explicit Unix timestamp.
    ///
    /// # Errors
    /// Returns [`ApiError::Serialization`] if the payload cannot be serialized.
    pub fn sign_at<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        timestamp: i64,
    ) -> Result<SignedRequest, ApiError> {
        Ok(SignedRequest::new(
            payload,
            self.config.seller_tax_id(),
            self.config.app_key(),
            timestamp,
        )?)
    }

    /// Sign `payload` and POST it to `path` under the base URL.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure of the single attempt.
    pub fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.build_endpoint(path)?;
        let request = self.sign(payload)?;
        post_signed(&self.client, url, &request)
    }

    /// Issue an invoice with a gateway-assigned number (`f0401`).
    ///
    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn create_invoice(&self, invoice: &InvoiceRecord) -> Result<ApiResponse, ApiError> {
        self.post(ISSUE_PATH, invoice)
    }

    /// Issue an invoice under a caller-chosen number (`f0401_custom`).
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number, otherwise see
    /// [`AmegoClient::post`].
    pub fn create_invoice_with_number(
        &self,
        invoice: &InvoiceRecord,
        invoice_number: &str,
    ) -> Result<ApiResponse, ApiError> {
        if invoice_number.trim().is_empty() {
            return Err(ApiError::InvalidRequest("invoice number is empty".into()));
        }
        let payload = NumberedInvoice {
            invoice,
            invoice_number,
        };
        self.post(ISSUE_WITH_NUMBER_PATH, &payload)
    }

    /// Void one or more issued invoices (`f0501`).
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `invoice_numbers` is empty.
    pub fn cancel_invoices(&self, invoice_numbers: &[&str]) -> Result<ApiResponse, ApiError> {
        ensure_numbers(invoice_numbers)?;
        let items: Vec<CancelItem<'_>> = invoice_numbers
            .iter()
            .map(|number| CancelItem {
                cancel_invoice_number: number,
            })
            .collect();
        self.post(CANCEL_PATH, &items)
    }

    /// Query processing status for one or more invoices.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `invoice_numbers` is empty.
    pub fn invoice_status(&self, invoice_numbers: &[&str]) -> Result<ApiResponse, ApiError> {
        ensure_numbers(invoice_numbers)?;
        let items: Vec<InvoiceNumberItem<'_>> = invoice_numbers
            .iter()
            .map(|number| InvoiceNumberItem {
                invoice_number: number,
            })
            .collect();
        self.post(STATUS_PATH, &items)
    }

    /// Fetch the full contents of one invoice.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn invoice_detail(&self, invoice_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[invoice_number])?;
        self.post(
            DETAIL_PATH,
            &InvoiceNumberItem {
                invoice_number,
            },
        )
    }

    /// Read the gateway clock. This endpoint is not signed.
    ///
    /// # Errors
    /// Returns [`ApiError`] for transport, status or parse failures.
    pub fn server_time(&self) -> Result<ServerTime, ApiError> {
        let url = self.build_endpoint(TIME_PATH)?;
        let response = self.client.get(url).send()?;
        parse_body(response).map(|(_, time)| time)
    }

    /// Seconds to add to the local clock to match the gateway, measured
    /// against the midpoint of the round trip.
    ///
    /// # Errors
    /// See [`AmegoClient::server_time`].
    pub fn time_offset(&self) -> Result<i64, ApiError> {
        Ok(self.read_clock()?.offset)
    }

    /// Server time and offset taken from a single `json/time` request.
    ///
    /// # Errors
    /// See [`AmegoClient::server_time`].
    pub fn read_clock(&self) -> Result<ClockReading, ApiError> {
        let before = unix_timestamp(0);
        let server = self.server_time()?;
        let after = unix_timestamp(0);
        let offset = server.unix_seconds() - (before + after) / 2;
        tracing::debug!(offset, "measured gateway clock offset");
        Ok(ClockReading {
            time: server.unix_seconds(),
            offset,
        })
    }

    /// List issued invoices (`invoice_list`).
    ///
    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn invoice_list(&self, query: &ListQuery) -> Result<ApiResponse, ApiError> {
        self.post(INVOICE_LIST_PATH, query)
    }

    /// Fetch the invoice PDF; decode it with [`ApiResponse::file_contents`].
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn invoice_file(&self, invoice_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[invoice_number])?;
        self.post(INVOICE_FILE_PATH, &InvoiceNumberItem { invoice_number })
    }

    /// Thermal printer data for an issued invoice.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn invoice_print(
        &self,
        invoice_number: &str,
        printer_type: u32,
        encoding: Option<PrinterEncoding>,
    ) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[invoice_number])?;
        let payload = PrintRequest {
            invoice_number: Some(invoice_number),
            allowance_number: None,
            printer_type,
            printer_lang: encoding,
        };
        self.post(INVOICE_PRINT_PATH, &payload)
    }

    /// Issue an allowance against earlier invoices (`g0401`).
    ///
    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn create_allowance(&self, allowance: &AllowanceRecord) -> Result<ApiResponse, ApiError> {
        self.post(ALLOWANCE_ISSUE_PATH, allowance)
    }

    /// Void one or more allowances (`g0501`).
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `allowance_numbers` is empty.
    pub fn cancel_allowances(&self, allowance_numbers: &[&str]) -> Result<ApiResponse, ApiError> {
        ensure_numbers(allowance_numbers)?;
        let items: Vec<CancelAllowanceItem<'_>> = allowance_numbers
            .iter()
            .map(|number| CancelAllowanceItem {
                cancel_allowance_number: number,
            })
            .collect();
        self.post(ALLOWANCE_CANCEL_PATH, &items)
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `allowance_numbers` is empty.
    pub fn allowance_status(&self, allowance_numbers: &[&str]) -> Result<ApiResponse, ApiError> {
        ensure_numbers(allowance_numbers)?;
        let items: Vec<AllowanceNumberItem<'_>> = allowance_numbers
            .iter()
            .map(|number| AllowanceNumberItem {
                allowance_number: number,
            })
            .collect();
        self.post(ALLOWANCE_STATUS_PATH, &items)
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn allowance_detail(&self, allowance_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[allowance_number])?;
        self.post(ALLOWANCE_DETAIL_PATH, &AllowanceNumberItem { allowance_number })
    }

    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn allowance_list(&self, query: &ListQuery) -> Result<ApiResponse, ApiError> {
        self.post(ALLOWANCE_LIST_PATH, query)
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn allowance_file(&self, allowance_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[allowance_number])?;
        self.post(ALLOWANCE_FILE_PATH, &AllowanceNumberItem { allowance_number })
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn allowance_print(
        &self,
        allowance_number: &str,
        printer_type: u32,
        encoding: Option<PrinterEncoding>,
    ) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[allowance_number])?;
        let payload = PrintRequest {
            invoice_number: None,
            allowance_number: Some(allowance_number),
            printer_type,
            printer_lang: encoding,
        };
        self.post(ALLOWANCE_PRINT_PATH, &payload)
    }

    /// Ask the gateway whether a mobile barcode carrier is registered.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty barcode.
    pub fn validate_barcode(&self, barcode: &str) -> Result<ApiResponse, ApiError> {
        if barcode.trim().is_empty() {
            return Err(ApiError::InvalidRequest("barcode is empty".into()));
        }
        self.post(BARCODE_PATH, &BarcodeQuery { barcode })
    }

    /// Look up registered company names by tax id (`ban_query`).
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `tax_ids` is empty.
    pub fn query_companies(&self, tax_ids: &[&str]) -> Result<ApiResponse, ApiError> {
        ensure_numbers(tax_ids)?;
        let items: Vec<BanItem<'_>> = tax_ids.iter().map(|ban| BanItem { ban }).collect();
        self.post(BAN_QUERY_PATH, &items)
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn lottery_status(&self, invoice_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[invoice_number])?;
        self.post(LOTTERY_STATUS_PATH, &InvoiceNumberItem { invoice_number })
    }

    /// Prize definitions, for `period` (e.g. `11312`) or the latest one.
    ///
    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn lottery_prizes(&self, period: Option<&str>) -> Result<ApiResponse, ApiError> {
        self.post(LOTTERY_PRIZES_PATH, &PeriodQuery { period })
    }

    /// # Errors
    /// See [`AmegoClient::post`].
    pub fn track_info(&self, period: Option<&str>) -> Result<ApiResponse, ApiError> {
        self.post(TRACK_INFO_PATH, &PeriodQuery { period })
    }

    /// Reserve `count` invoice numbers, optionally from one track.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] when `count` is zero.
    pub fn reserve_numbers(
        &self,
        count: u32,
        track_api_code: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        if count == 0 {
            return Err(ApiError::InvalidRequest("count must be positive".into()));
        }
        self.post(
            TRACK_GET_PATH,
            &TrackRequest {
                count,
                track_api_code,
            },
        )
    }

    /// # Errors
    /// Returns [`ApiError::InvalidRequest`] for an empty number.
    pub fn number_status(&self, invoice_number: &str) -> Result<ApiResponse, ApiError> {
        ensure_numbers(&[invoice_number])?;
        self.post(TRACK_STATUS_PATH, &InvoiceNumberItem { invoice_number })
    }
}

// Private API
impl AmegoClient {
    fn build_endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url()
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::InvalidRequest(format!("bad endpoint {path:?}: {err}")))
    }
}

fn build_http_client(timeout: std::time::Duration) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()?)
}

fn post_signed(client: &Client, url: Url, request: &SignedRequest) -> Result<ApiResponse, ApiError> {
    let body = request.to_form_body()?;
    tracing::debug!(%url, time = request.time(), "posting signed request");
    let response = client
        .post(url)
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(body)
        .send()?;
    read_json(response)
}

fn read_json(response: Response) -> Result<ApiResponse, ApiError> {
    let (status, value) = parse_body(response)?;
    Ok(ApiResponse {
        status: status.as_u16(),
        value,
    })
}

/// Check the status, then decode the body bytes as JSON without a lossy
/// text conversion in between.
fn parse_body<T: DeserializeOwned>(response: Response) -> Result<(StatusCode, T), ApiError> {
    let status = response.status();
    let raw = response.bytes()?.to_vec();
    ensure_success(status, &raw)?;
    match serde_json::from_slice(&raw) {
        Ok(value) => Ok((status, value)),
        Err(source) => Err(ApiError::ResponseParse {
            source,
            body: String::from_utf8_lossy(&raw).into_owned(),
            raw,
        }),
    }
}

fn ensure_success(status: StatusCode, raw: &[u8]) -> Result<(), ApiError> {
    if status.is_success() {
        return Ok(());
    }
    tracing::warn!(status = status.as_u16(), "gateway returned non-success status");
    Err(ApiError::HttpStatus {
        status: status.as_u16(),
        body: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn ensure_numbers(numbers: &[&str]) -> Result<(), ApiError> {
    if numbers.is_empty() {
        return Err(ApiError::InvalidRequest("no numbers given".into()));
    }
    if numbers.iter().any(|number| number.trim().is_empty()) {
        return Err(ApiError::InvalidRequest("number is empty".into()));
    }
    Ok(())
}

fn unix_timestamp(offset: i64) -> i64 {
    chrono::Utc::now().timestamp() + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowance::{AllowanceFields, AllowanceItem, AllowanceItemFields};
    use crate::invoice::{InvoiceBuilder, LineItem, LineItemFields, ProductTaxType, RequiredInvoiceFields};
    use httpmock::{Method::GET, Method::POST, MockServer};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    const SELLER: &str = "12345678";
    const APP_KEY: &str = "sHeq7t8G1wiQvhAuIM27";

    fn try_start_server() -> Option<MockServer> {
        std::panic::catch_unwind(MockServer::start).ok()
    }

    fn client_for(server: &MockServer) -> AmegoClient {
        let config = Config::new(SELLER, APP_KEY)
            .expect("config")
            .with_base_url(&server.base_url())
            .expect("base url");
        AmegoClient::new(config).expect("client")
    }

    fn build_invoice() -> InvoiceRecord {
        InvoiceBuilder::new(RequiredInvoiceFields {
            order_id: "A20240101000001".into(),
            buyer_identifier: "28080623".into(),
            buyer_name: "Buyer Co".into(),
            line_items: vec![LineItem::new(LineItemFields {
                description: "Widget".into(),
                quantity: dec!(2),
                unit_price: dec!(52.5),
                tax_type: ProductTaxType::Taxable,
            })
            .expect("line item")],
        })
        .build()
        .expect("invoice")
    }

    #[test]
    fn deserialize_server_time_accepts_both_field_names() {
        let time: ServerTime = serde_json::from_str(r#"{"time": 1597645574}"#).expect("time");
        assert_eq!(time.unix_seconds(), 1597645574);
        let time: ServerTime =
            serde_json::from_str(r#"{"timestamp": 1597645575, "text": "x"}"#).expect("timestamp");
        assert_eq!(time.unix_seconds(), 1597645575);
    }

    #[test]
    fn numbered_invoice_appends_invoice_number() {
        let invoice = build_invoice();
        let payload = NumberedInvoice {
            invoice: &invoice,
            invoice_number: "AB12345678",
        };
        let data = crate::sign::canonical_json(&payload).expect("json");
        let plain = crate::sign::canonical_json(&invoice).expect("json");
        assert!(data.starts_with(&plain[..plain.len() - 1]));
        assert!(data.ends_with(r#","InvoiceNumber":"AB12345678"}"#));
    }

    #[test]
    fn build_endpoint_trims_leading_slash() {
        let client = AmegoClient::new(Config::new(SELLER, APP_KEY).expect("config")).expect("client");
        let with_slash = client.build_endpoint("/json/f0401").expect("url");
        let without_slash = client.build_endpoint("json/f0401").expect("url");
        assert_eq!(with_slash, without_slash);
        assert_eq!(with_slash.as_str(), "https://invoice-api.amego.tw/json/f0401");
    }

    #[test]
    fn sign_at_uses_configured_credentials() {
        let client = AmegoClient::new(Config::new(SELLER, APP_KEY).expect("config")).expect("client");
        let signed = client.sign_at(&json!([]), 1597645574).expect("signed");
        assert_eq!(signed.seller_tax_id(), SELLER);
        assert_eq!(signed.time(), 1597645574);
        assert!(signed.verify(APP_KEY));
    }

    #[test]
    fn empty_number_lists_are_rejected_locally() {
        let client = AmegoClient::new(Config::new(SELLER, APP_KEY).expect("config")).expect("client");
        assert!(matches!(client.cancel_invoices(&[]), Err(ApiError::InvalidRequest(_))));
        assert!(matches!(client.invoice_status(&[" "]), Err(ApiError::InvalidRequest(_))));
        assert!(matches!(client.invoice_detail(""), Err(ApiError::InvalidRequest(_))));
        let invoice = build_invoice();
        assert!(matches!(
            client.create_invoice_with_number(&invoice, ""),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn submit_rejects_empty_seller() {
        let url = Url::parse("http://127.0.0.1:9/json/f0401").expect("url");
        let result = submit(&build_invoice(), " ", APP_KEY, &url);
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn create_invoice_posts_signed_form() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/f0401")
                .header("content-type", FORM_CONTENT_TYPE)
                .body_contains("invoice=12345678&data=%7B%22OrderId%22%3A%22A20240101000001%22")
                .body_contains("&time=")
                .body_contains("&sign=");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"code": 0, "msg": "", "invoice_number": "AB00000001"}));
        });

        let client = client_for(&server);
        let response = client.create_invoice(&build_invoice()).expect("response");
        assert_eq!(response.status(), 200);
        assert_eq!(response.code(), Some(0));
        assert_eq!(response.value()["invoice_number"], "AB00000001");
        mock.assert();
    }

    #[test]
    fn domain_error_codes_are_returned_not_raised() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let mock = server.mock(|when, then| {
            when.method(POST).path("/json/f0501");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"code": 2, "msg": "sign error"}"#);
        });

        let client = client_for(&server);
        let response = client.cancel_invoices(&["AB00000001", "AB00000002"]).expect("response");
        assert_eq!(response.code(), Some(2));
        assert_eq!(response.message(), Some("sign error"));
        mock.assert();
    }

    #[test]
    fn status_and_detail_use_their_endpoints() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let status_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/invoice_status")
                .body_contains("%5B%7B%22InvoiceNumber%22%3A%22AB00000001%22%7D%5D");
            then.status(200).body(r#"{"code":0,"msg":"","data":[]}"#);
        });
        let detail_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/invoice_query")
                .body_contains("%7B%22InvoiceNumber%22%3A%22AB00000001%22%7D");
            then.status(200).body(r#"{"code":0,"msg":"","data":{}}"#);
        });

        let client = client_for(&server);
        client.invoice_status(&["AB00000001"]).expect("status");
        client.invoice_detail("AB00000001").expect("detail");
        status_mock.assert();
        detail_mock.assert();
    }

    fn allowance() -> AllowanceRecord {
        let item = AllowanceItem::new(AllowanceItemFields {
            original_invoice_number: "AB00000001".into(),
            original_invoice_date: "20240105".into(),
            original_description: "Widget".into(),
            quantity: dec!(1),
            unit_price: dec!(50),
            tax: ProductTaxType::Taxable,
        })
        .expect("item");
        AllowanceRecord::new(AllowanceFields {
            allowance_number: "AL0001".into(),
            allowance_date: NaiveDate::from_ymd_opt(2024, 1, 20).expect("date"),
            buyer_identifier: "28080623".into(),
            buyer_name: "Buyer Co".into(),
            items: vec![item],
            tax_amount: dec!(2),
            total_amount: dec!(50),
        })
        .expect("allowance")
    }

    #[test]
    fn allowance_calls_use_their_endpoints() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let issue_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/g0401")
                .body_contains("data=%7B%22AllowanceNumber%22%3A%22AL0001%22");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let cancel_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/g0501")
                .body_contains("%5B%7B%22CancelAllowanceNumber%22%3A%22AL0001%22%7D%5D");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let status_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/allowance_status")
                .body_contains("%5B%7B%22AllowanceNumber%22%3A%22AL0001%22%7D%5D");
            then.status(200).body(r#"{"code":0,"msg":"","data":[]}"#);
        });
        let detail_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/allowance_query")
                .body_contains("data=%7B%22AllowanceNumber%22%3A%22AL0001%22%7D&");
            then.status(200).body(r#"{"code":0,"msg":"","data":{}}"#);
        });

        let client = client_for(&server);
        client.create_allowance(&allowance()).expect("issue");
        client.cancel_allowances(&["AL0001"]).expect("cancel");
        client.allowance_status(&["AL0001"]).expect("status");
        client.allowance_detail("AL0001").expect("detail");
        issue_mock.assert();
        cancel_mock.assert();
        status_mock.assert();
        detail_mock.assert();
        assert!(matches!(client.cancel_allowances(&[]), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn list_queries_omit_unset_fields() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let invoice_mock = server.mock(|when, then| {
            when.method(POST).path("/json/invoice_list").body_contains(
                "data=%7B%22start_date%22%3A%222024-01-01%22%2C%22end_date%22%3A%222024-01-31%22%2C%22page%22%3A1%2C%22page_size%22%3A20%7D&",
            );
            then.status(200).body(r#"{"code":0,"msg":"","data":[]}"#);
        });
        let allowance_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/allowance_list")
                .body_contains("data=%7B%7D&");
            then.status(200).body(r#"{"code":0,"msg":"","data":[]}"#);
        });

        let client = client_for(&server);
        let query = ListQuery::default()
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"))
            .end_date(NaiveDate::from_ymd_opt(2024, 1, 31).expect("date"))
            .page(1, 20);
        client.invoice_list(&query).expect("invoice list");
        client.allowance_list(&ListQuery::default()).expect("allowance list");
        invoice_mock.assert();
        allowance_mock.assert();
    }

    #[test]
    fn invoice_file_decodes_base64_data() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/invoice_file")
                .body_contains("data=%7B%22InvoiceNumber%22%3A%22AB00000001%22%7D&");
            then.status(200)
                .body(r#"{"code":0,"msg":"","base64_data":"JVBERi0xLjQ="}"#);
        });
        let failed_mock = server.mock(|when, then| {
            when.method(POST).path("/json/allowance_file");
            then.status(200).body(r#"{"code":1,"msg":"not found"}"#);
        });

        let client = client_for(&server);
        let response = client.invoice_file("AB00000001").expect("file");
        assert_eq!(response.file_contents().expect("pdf"), b"%PDF-1.4");
        let response = client.allowance_file("AL0001").expect("file");
        let err = response.file_contents().unwrap_err();
        assert!(matches!(err, ApiError::InvalidFile(_)));
        assert!(err.to_string().contains("not found"));
        mock.assert();
        failed_mock.assert();
    }

    #[test]
    fn print_requests_carry_printer_settings() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let invoice_mock = server.mock(|when, then| {
            when.method(POST).path("/json/invoice_print").body_contains(
                "data=%7B%22InvoiceNumber%22%3A%22AB00000001%22%2C%22PrinterType%22%3A2%2C%22PrinterLang%22%3A3%7D&",
            );
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let allowance_mock = server.mock(|when, then| {
            when.method(POST).path("/json/allowance_print").body_contains(
                "data=%7B%22AllowanceNumber%22%3A%22AL0001%22%2C%22PrinterType%22%3A1%7D&",
            );
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });

        let client = client_for(&server);
        client
            .invoice_print("AB00000001", 2, Some(PrinterEncoding::Utf8))
            .expect("invoice print");
        client.allowance_print("AL0001", 1, None).expect("allowance print");
        invoice_mock.assert();
        allowance_mock.assert();
    }

    #[test]
    fn company_and_barcode_lookups() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let ban_mock = server.mock(|when, then| {
            when.method(POST).path("/json/ban_query").body_contains(
                "data=%5B%7B%22ban%22%3A%2228080623%22%7D%2C%7B%22ban%22%3A%2212345678%22%7D%5D&",
            );
            then.status(200)
                .body(r#"{"code":0,"msg":"","data":[{"ban":"28080623","name":"光貿科技有限公司"}]}"#);
        });
        let barcode_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/barcode")
                .body_contains("data=%7B%22Barcode%22%3A%22%2FABC%2B123%22%7D&");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });

        let client = client_for(&server);
        let response = client.query_companies(&["28080623", "12345678"]).expect("ban");
        assert_eq!(response.value()["data"][0]["name"], "光貿科技有限公司");
        client.validate_barcode("/ABC+123").expect("barcode");
        ban_mock.assert();
        barcode_mock.assert();
        assert!(matches!(client.validate_barcode(" "), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn lottery_and_track_calls_use_their_endpoints() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let lottery_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/lottery_status")
                .body_contains("data=%7B%22InvoiceNumber%22%3A%22AB00000001%22%7D&");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let prizes_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/lottery_type")
                .body_contains("data=%7B%22Period%22%3A%2211312%22%7D&");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let track_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/track_all")
                .body_contains("data=%7B%7D&");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let reserve_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/json/track_get")
                .body_contains("data=%7B%22Count%22%3A50%2C%22TrackApiCode%22%3A%22T1%22%7D&");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });
        let number_mock = server.mock(|when, then| {
            when.method(POST).path("/json/track_status");
            then.status(200).body(r#"{"code":0,"msg":""}"#);
        });

        let client = client_for(&server);
        client.lottery_status("AB00000001").expect("lottery");
        client.lottery_prizes(Some("11312")).expect("prizes");
        client.track_info(None).expect("tracks");
        client.reserve_numbers(50, Some("T1")).expect("reserve");
        client.number_status("AB00000001").expect("number");
        lottery_mock.assert();
        prizes_mock.assert();
        track_mock.assert();
        reserve_mock.assert();
        number_mock.assert();
        assert!(matches!(client.reserve_numbers(0, None), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn server_error_surfaces_status_and_body() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let mock = server.mock(|when, then| {
            when.method(POST).path("/json/f0401");
            then.status(500).body("internal failure");
        });

        let client = client_for(&server);
        let err = client.create_invoice(&build_invoice()).unwrap_err();
        match &err {
            ApiError::HttpStatus { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "internal failure");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        assert_eq!(err.status(), Some(500));
        mock.assert();
    }

    #[test]
    fn malformed_body_keeps_raw_text() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        server.mock(|when, then| {
            when.method(POST).path("/json/f0401");
            then.status(200).body("<html>maintenance</html>");
        });

        let client = client_for(&server);
        let err = client.create_invoice(&build_invoice()).unwrap_err();
        assert!(matches!(err, ApiError::ResponseParse { .. }));
        assert_eq!(err.body(), Some("<html>maintenance</html>"));
    }

    #[test]
    fn non_utf8_body_is_kept_byte_for_byte() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        server.mock(|when, then| {
            when.method(POST).path("/json/f0401");
            then.status(200).body(vec![0xff, 0xfe, b'{']);
        });

        let client = client_for(&server);
        let err = client.create_invoice(&build_invoice()).unwrap_err();
        assert!(matches!(err, ApiError::ResponseParse { .. }));
        assert_eq!(err.raw_body(), Some(&[0xff, 0xfe, b'{'][..]));
    }

    #[test]
    fn redirects_are_not_followed() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        server.mock(|when, then| {
            when.method(POST).path("/json/f0401");
            then.status(302).header("location", "/elsewhere");
        });

        let client = client_for(&server);
        let err = client.create_invoice(&build_invoice()).unwrap_err();
        assert_eq!(err.status(), Some(302));
    }

    #[test]
    fn server_time_and_offset() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        let now = chrono::Utc::now().timestamp();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/json/time");
            then.status(200)
                .body(format!(r#"{{"time": {}}}"#, now + 120));
        });

        let client = client_for(&server);
        let reading = client.read_clock().expect("clock");
        assert_eq!(reading.time, now + 120);
        assert!((118..=122).contains(&reading.offset), "offset {}", reading.offset);
        mock.assert_hits(1);
    }

    #[test]
    fn timeout_is_a_transport_error() {
        let server = match try_start_server() {
            Some(server) => server,
            None => return,
        };
        server.mock(|when, then| {
            when.method(POST).path("/json/f0401");
            then.status(200).delay(Duration::from_secs(3)).body("{}");
        });

        let config = Config::new(SELLER, APP_KEY)
            .expect("config")
            .with_base_url(&server.base_url())
            .expect("base url")
            .with_timeout(Duration::from_millis(200))
            .expect("timeout");
        let client = AmegoClient::new(config).expect("client");
        let err = client.create_invoice(&build_invoice()).unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[test]
    fn connection_refused_is_a_transport_error() {
        let url = Url::parse("http://127.0.0.1:9/json/f0401").expect("url");
        let err = submit(&build_invoice(), SELLER, APP_KEY, &url).unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.body(), None);
    }
}
