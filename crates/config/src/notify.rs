// Copyright 2024 FerroFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Notification target configuration arguments. The drivers themselves are
//! external; only the argument schema and its validation live here. Unknown
//! fields in the config document are tolerated so driver-specific knobs can
//! pass through untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn config_err(message: &str) -> TargetError {
    TargetError::Configuration(message.to_string())
}

const ACCEPTED_FORMATS: &[&str] = &["namespace", "access"];

/// A present, non-empty `format` must name one of the target's accepted
/// event formats.
fn validate_format(format: Option<&String>) -> Result<(), TargetError> {
    match format {
        None => Ok(()),
        Some(f) if f.is_empty() => Ok(()),
        Some(f) if ACCEPTED_FORMATS.contains(&f.as_str()) => Ok(()),
        Some(f) => Err(TargetError::Configuration(format!("unrecognized format value '{f}'"))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmqpArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub exchange: String,
}

impl AmqpArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        if self.url.is_empty() {
            return Err(config_err("url empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NatsArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub subject: String,
}

impl NatsArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        if self.address.is_empty() {
            return Err(config_err("address empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElasticsearchArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl ElasticsearchArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        validate_format(self.format.as_ref())?;
        if self.url.is_empty() {
            return Err(config_err("url empty"));
        }
        if self.index.is_empty() {
            return Err(config_err("index empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl RedisArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        validate_format(self.format.as_ref())?;
        if self.address.is_empty() {
            return Err(config_err("address empty"));
        }
        if self.key.is_empty() {
            return Err(config_err("key empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl PostgresArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        validate_format(self.format.as_ref())?;
        if self.host.is_empty() {
            return Err(config_err("host empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySqlArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub dsn_string: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl MySqlArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        validate_format(self.format.as_ref())?;
        if self.host.is_empty() {
            return Err(config_err("host empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub brokers: Option<Vec<String>>,
    #[serde(default)]
    pub topic: String,
}

impl KafkaArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        match &self.brokers {
            Some(brokers) if !brokers.is_empty() => Ok(()),
            _ => Err(config_err("brokers empty")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub endpoint: String,
}

impl WebhookArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        if self.endpoint.is_empty() {
            return Err(config_err("endpoint empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub broker: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
}

impl MqttArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        if self.broker.is_empty() {
            return Err(config_err("broker empty"));
        }
        if self.topic.is_empty() {
            return Err(config_err("topic empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsqArgs {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub nsqd_address: String,
    #[serde(default)]
    pub topic: String,
}

impl NsqArgs {
    pub fn validate(&self) -> Result<(), TargetError> {
        if !self.enable {
            return Ok(());
        }
        if self.nsqd_address.is_empty() {
            return Err(config_err("nsqdAddress empty"));
        }
        if self.topic.is_empty() {
            return Err(config_err("topic empty"));
        }
        Ok(())
    }
}
