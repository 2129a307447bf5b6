//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::tariff::{TariffRule, TariffWindow};
use anyhow::Context;
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// What to do when a plate exists in both operators' stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossOperatorPolicy {
    /// Any match in Operator B's store wins (the historical behavior)
    PreferOperatorB,
    /// A match in Operator A's store wins; B only handles plates A has never seen
    PreferOperatorA,
    /// Refuse the request and log a data-integrity error
    Reject,
}

impl CrossOperatorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossOperatorPolicy::PreferOperatorB => "prefer_operator_b",
            CrossOperatorPolicy::PreferOperatorA => "prefer_operator_a",
            CrossOperatorPolicy::Reject => "reject",
        }
    }
}

/// Display names and static texts used in replies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branding {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_operator_a_name")]
    pub operator_a_name: String,
    /// Possessive form used in the payment confirmation ("Ridgeway's parking")
    #[serde(default = "default_operator_a_possessive")]
    pub operator_a_possessive: String,
    #[serde(default = "default_operator_b_name")]
    pub operator_b_name: String,
    #[serde(default = "default_terms")]
    pub terms: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            operator_a_name: default_operator_a_name(),
            operator_a_possessive: default_operator_a_possessive(),
            operator_b_name: default_operator_b_name(),
            terms: default_terms(),
        }
    }
}

fn default_service_name() -> String {
    "SyfePark".to_string()
}

fn default_operator_a_name() -> String {
    "Ridgeways".to_string()
}

fn default_operator_a_possessive() -> String {
    "Ridgeway's".to_string()
}

fn default_operator_b_name() -> String {
    "RNG".to_string()
}

fn default_terms() -> String {
    "Ridgeways Mall Terms & Conditions...\n(Your data is safe, etc.)".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest request body accepted from a channel gateway
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct UssdConfig {
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

impl Default for UssdConfig {
    fn default() -> Self {
        Self { sentinel: default_sentinel() }
    }
}

fn default_sentinel() -> String {
    "98".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    /// Start of the day window, "HH:MM" or "HH:MM:SS" (inclusive)
    #[serde(default = "default_day_start")]
    pub day_start: String,
    /// End of the day window (exclusive)
    #[serde(default = "default_day_end")]
    pub day_end: String,
    #[serde(default = "default_day_window")]
    pub day: TariffWindow,
    #[serde(default = "default_night_window")]
    pub night: TariffWindow,
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            day_start: default_day_start(),
            day_end: default_day_end(),
            day: default_day_window(),
            night: default_night_window(),
            hourly_rate: default_hourly_rate(),
            currency: default_currency(),
        }
    }
}

fn default_day_start() -> String {
    "06:00:00".to_string()
}

fn default_day_end() -> String {
    "22:00:00".to_string()
}

fn default_day_window() -> TariffWindow {
    TariffWindow { free_minutes: Some(30), base_fee: 50, base_window_minutes: 120 }
}

fn default_night_window() -> TariffWindow {
    TariffWindow { free_minutes: None, base_fee: 50, base_window_minutes: 60 }
}

fn default_hourly_rate() -> u64 {
    50
}

fn default_currency() -> String {
    "KES".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoresConfig {
    /// `memory` or a sqlx SQLite URL
    #[serde(default = "default_store_url")]
    pub operator_a: String,
    #[serde(default = "default_store_url")]
    pub operator_b: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self { operator_a: default_store_url(), operator_b: default_store_url() }
    }
}

fn default_store_url() -> String {
    "memory".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorBConfig {
    #[serde(default = "default_fee_url")]
    pub fee_url: String,
    #[serde(default = "default_fee_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OperatorBConfig {
    fn default() -> Self {
        Self { fee_url: default_fee_url(), timeout_ms: default_fee_timeout_ms() }
    }
}

fn default_fee_url() -> String {
    "http://localhost:8090/fee".to_string()
}

fn default_fee_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_push_url")]
    pub push_url: String,
    #[serde(default = "default_push_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self { push_url: default_push_url(), timeout_ms: default_push_timeout_ms() }
    }
}

fn default_push_url() -> String {
    "https://ridgemall.syfe.co.ke/pushpayment/".to_string()
}

fn default_push_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_infobip_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default = "default_template_language")]
    pub language: String,
    #[serde(default = "default_header_image_url")]
    pub header_image_url: String,
    /// Amount shown in the payment template body
    #[serde(default = "default_template_amount")]
    pub template_amount: u64,
    #[serde(default = "default_whatsapp_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_infobip_base_url(),
            api_key: String::new(),
            sender: String::new(),
            template_name: default_template_name(),
            language: default_template_language(),
            header_image_url: default_header_image_url(),
            template_amount: default_template_amount(),
            timeout_ms: default_whatsapp_timeout_ms(),
        }
    }
}

fn default_infobip_base_url() -> String {
    "https://api.infobip.com".to_string()
}

fn default_template_name() -> String {
    "ridgewayspushpayment".to_string()
}

fn default_template_language() -> String {
    "en_GB".to_string()
}

fn default_header_image_url() -> String {
    "https://syfe.co.ke/assets/img/LOGOgreen.png".to_string()
}

fn default_template_amount() -> u64 {
    50
}

fn default_whatsapp_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct IvrConfig {
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Path the gather posts the pressed digit back to
    #[serde(default = "default_ivr_action")]
    pub action: String,
    #[serde(default = "default_max_vehicles")]
    pub max_vehicles: usize,
}

impl Default for IvrConfig {
    fn default() -> Self {
        Self { voice: default_voice(), action: default_ivr_action(), max_vehicles: default_max_vehicles() }
    }
}

fn default_voice() -> String {
    "Polly.Joanna".to_string()
}

fn default_ivr_action() -> String {
    "/twilio/ivr/".to_string()
}

fn default_max_vehicles() -> usize {
    9
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_cross_operator")]
    pub cross_operator: CrossOperatorPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { cross_operator: default_cross_operator() }
    }
}

fn default_cross_operator() -> CrossOperatorPolicy {
    CrossOperatorPolicy::PreferOperatorB
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: Branding,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ussd: UssdConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub operator_b: OperatorBConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub ivr: IvrConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    branding: Branding,
    bind_address: String,
    port: u16,
    max_body_bytes: usize,
    ussd_sentinel: String,
    tariff: TariffRule,
    currency: String,
    operator_a_store: String,
    operator_b_store: String,
    operator_b_fee_url: String,
    operator_b_timeout_ms: u64,
    push_url: String,
    push_timeout_ms: u64,
    whatsapp: WhatsAppConfig,
    ivr_voice: String,
    ivr_action: String,
    ivr_max_vehicles: usize,
    metrics_interval_secs: u64,
    cross_operator_policy: CrossOperatorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: "default".to_string(),
            branding: Branding::default(),
            bind_address: default_bind_address(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            ussd_sentinel: default_sentinel(),
            tariff: TariffRule::default(),
            currency: default_currency(),
            operator_a_store: default_store_url(),
            operator_b_store: default_store_url(),
            operator_b_fee_url: default_fee_url(),
            operator_b_timeout_ms: default_fee_timeout_ms(),
            push_url: default_push_url(),
            push_timeout_ms: default_push_timeout_ms(),
            whatsapp: WhatsAppConfig::default(),
            ivr_voice: default_voice(),
            ivr_action: default_ivr_action(),
            ivr_max_vehicles: default_max_vehicles(),
            metrics_interval_secs: default_metrics_interval(),
            cross_operator_policy: default_cross_operator(),
        }
    }
}

/// Parse "HH:MM:SS" or "HH:MM"
fn parse_time_of_day(raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("Invalid time of day {raw:?}"))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, &path.display().to_string())
    }

    fn from_toml(toml_config: TomlConfig, config_file: &str) -> anyhow::Result<Self> {
        let tariff_config = toml_config.tariff;
        let tariff = TariffRule::new(
            parse_time_of_day(&tariff_config.day_start).context("tariff.day_start")?,
            parse_time_of_day(&tariff_config.day_end).context("tariff.day_end")?,
            tariff_config.day,
            tariff_config.night,
            tariff_config.hourly_rate,
        );

        anyhow::ensure!(!toml_config.ussd.sentinel.is_empty(), "ussd.sentinel must not be empty");
        anyhow::ensure!(
            (1..=9).contains(&toml_config.ivr.max_vehicles),
            "ivr.max_vehicles must be between 1 and 9"
        );

        Ok(Self {
            config_file: config_file.to_string(),
            branding: toml_config.site,
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            max_body_bytes: toml_config.server.max_body_bytes,
            ussd_sentinel: toml_config.ussd.sentinel,
            tariff,
            currency: tariff_config.currency,
            operator_a_store: toml_config.stores.operator_a,
            operator_b_store: toml_config.stores.operator_b,
            operator_b_fee_url: toml_config.operator_b.fee_url,
            operator_b_timeout_ms: toml_config.operator_b.timeout_ms,
            push_url: toml_config.payment.push_url,
            push_timeout_ms: toml_config.payment.timeout_ms,
            whatsapp: toml_config.whatsapp,
            ivr_voice: toml_config.ivr.voice,
            ivr_action: toml_config.ivr.action,
            ivr_max_vehicles: toml_config.ivr.max_vehicles,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            cross_operator_policy: toml_config.policy.cross_operator,
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn branding(&self) -> &Branding {
        &self.branding
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn ussd_sentinel(&self) -> &str {
        &self.ussd_sentinel
    }

    pub fn tariff(&self) -> &TariffRule {
        &self.tariff
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn operator_a_store(&self) -> &str {
        &self.operator_a_store
    }

    pub fn operator_b_store(&self) -> &str {
        &self.operator_b_store
    }

    pub fn operator_b_fee_url(&self) -> &str {
        &self.operator_b_fee_url
    }

    pub fn operator_b_timeout_ms(&self) -> u64 {
        self.operator_b_timeout_ms
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    pub fn push_timeout_ms(&self) -> u64 {
        self.push_timeout_ms
    }

    pub fn whatsapp(&self) -> &WhatsAppConfig {
        &self.whatsapp
    }

    pub fn ivr_voice(&self) -> &str {
        &self.ivr_voice
    }

    pub fn ivr_action(&self) -> &str {
        &self.ivr_action
    }

    pub fn ivr_max_vehicles(&self) -> usize {
        self.ivr_max_vehicles
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn cross_operator_policy(&self) -> CrossOperatorPolicy {
        self.cross_operator_policy
    }

    /// Builder method for tests to set the cross-operator policy
    pub fn with_cross_operator_policy(mut self, policy: CrossOperatorPolicy) -> Self {
        self.cross_operator_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.config_file(), "default");
        assert_eq!(config.port(), 8000);
        assert_eq!(config.ussd_sentinel(), "98");
        assert_eq!(config.currency(), "KES");
        assert_eq!(config.tariff(), &TariffRule::default());
        assert_eq!(config.ivr_max_vehicles(), 9);
        assert_eq!(config.cross_operator_policy(), CrossOperatorPolicy::PreferOperatorB);
        assert!(!config.whatsapp().enabled);
        assert_eq!(config.branding().operator_b_name, "RNG");
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("06:00").unwrap(), NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert_eq!(
            parse_time_of_day("21:30:15").unwrap(),
            NaiveTime::from_hms_opt(21, 30, 15).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[ussd]
sentinel = "384"

[policy]
cross_operator = "reject"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline").unwrap();
        assert_eq!(config.ussd_sentinel(), "384");
        assert_eq!(config.cross_operator_policy(), CrossOperatorPolicy::Reject);
        assert_eq!(config.push_timeout_ms(), 15_000);
        assert_eq!(config.tariff(), &TariffRule::default());
    }

    #[test]
    fn test_rejects_bad_ivr_limit() {
        let toml_config: TomlConfig = toml::from_str("[ivr]\nmax_vehicles = 12\n").unwrap();
        assert!(Config::from_toml(toml_config, "inline").is_err());
    }
}
