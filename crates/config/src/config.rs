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

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::notify::{
    AmqpArgs, ElasticsearchArgs, KafkaArgs, MqttArgs, MySqlArgs, NatsArgs, NsqArgs, PostgresArgs, RedisArgs, WebhookArgs,
};
use crate::{DEFAULT_REGION, SERVER_CONFIG_VERSION};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub amqp: HashMap<String, AmqpArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub elasticsearch: HashMap<String, ElasticsearchArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub kafka: HashMap<String, KafkaArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub mqtt: HashMap<String, MqttArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub mysql: HashMap<String, MySqlArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub nats: HashMap<String, NatsArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub nsq: HashMap<String, NsqArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub postgresql: HashMap<String, PostgresArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub redis: HashMap<String, RedisArgs>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webhook: HashMap<String, WebhookArgs>,
}

/// The server configuration document, parsed leniently so that validation
/// can apply its rules in a defined order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyConfig>,
}

impl ServerConfig {
    /// A fresh default config, written on first server start.
    pub fn new_default(access_key: &str, secret_key: &str) -> Self {
        Self {
            version: SERVER_CONFIG_VERSION.to_string(),
            credential: Some(Credential {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            }),
            region: Some(DEFAULT_REGION.to_string()),
            browser: Some("on".to_string()),
            domain: None,
            worm: None,
            notify: None,
        }
    }

    /// Region, defaulted to `us-east-1` when absent.
    pub fn region(&self) -> &str {
        match self.region.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => DEFAULT_REGION,
        }
    }

    /// Browser flag, defaulted to on when absent.
    pub fn browser_enabled(&self) -> bool {
        self.browser.as_deref() != Some("off")
    }

    pub fn worm_enabled(&self) -> bool {
        self.worm.as_deref() == Some("on")
    }

    /// Applies the validation rules in order; the first failure wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SERVER_CONFIG_VERSION {
            return Err(ConfigError::Version {
                expected: SERVER_CONFIG_VERSION.to_string(),
                found: self.version.clone(),
            });
        }

        if let Some(browser) = self.browser.as_deref() {
            if browser != "on" && browser != "off" {
                return Err(ConfigError::InvalidBrowser(browser.to_string()));
            }
        }

        let credential = self.credential.as_ref().ok_or(ConfigError::MissingCredential)?;
        if credential.access_key.is_empty() {
            return Err(ConfigError::InvalidCredential("accessKey empty".to_string()));
        }
        if credential.secret_key.is_empty() {
            return Err(ConfigError::InvalidCredential("secretKey empty".to_string()));
        }

        if let Some(worm) = self.worm.as_deref() {
            if worm != "on" && worm != "off" {
                return Err(ConfigError::InvalidWorm(worm.to_string()));
            }
        }

        if let Some(notify) = &self.notify {
            notify.validate()?;
        }

        Ok(())
    }
}

macro_rules! validate_targets {
    ($map:expr, $name:literal) => {
        for (id, args) in $map {
            args.validate().map_err(|e| ConfigError::Target {
                target: $name,
                id: id.clone(),
                message: e.to_string(),
            })?;
        }
    };
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_targets!(&self.amqp, "amqp");
        validate_targets!(&self.elasticsearch, "elasticsearch");
        validate_targets!(&self.kafka, "kafka");
        validate_targets!(&self.mqtt, "mqtt");
        validate_targets!(&self.mysql, "mysql");
        validate_targets!(&self.nats, "nats");
        validate_targets!(&self.nsq, "nsq");
        validate_targets!(&self.postgresql, "postgresql");
        validate_targets!(&self.redis, "redis");
        validate_targets!(&self.webhook, "webhook");
        Ok(())
    }
}

/// Marker type whose `Deserialize` walks the whole document rejecting
/// duplicate object keys at any level. `serde_json` is last-wins by default,
/// so this runs as a separate pre-pass.
struct DupCheck;

impl<'de> Deserialize<'de> for DupCheck {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DupVisitor;

        impl<'de> Visitor<'de> for DupVisitor {
            type Value = DupCheck;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_map<A>(self, mut map: A) -> Result<DupCheck, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = HashSet::new();
                while let Some(key) = map.next_key::<String>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key '{key}'")));
                    }
                    map.next_value::<DupCheck>()?;
                }
                Ok(DupCheck)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<DupCheck, A::Error>
            where
                A: SeqAccess<'de>,
            {
                while seq.next_element::<DupCheck>()?.is_some() {}
                Ok(DupCheck)
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }

            fn visit_str<E: de::Error>(self, _: &str) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }

            fn visit_unit<E: de::Error>(self) -> Result<DupCheck, E> {
                Ok(DupCheck)
            }
        }

        deserializer.deserialize_any(DupVisitor)
    }
}

fn check_duplicate_keys(data: &str) -> Result<(), ConfigError> {
    match serde_json::from_str::<DupCheck>(data) {
        Ok(_) => Ok(()),
        Err(err) => {
            let message = err.to_string();
            if let Some(rest) = message.strip_prefix("duplicate key '") {
                let key = rest.split('\'').next().unwrap_or_default().to_string();
                Err(ConfigError::DuplicateKey(key))
            } else {
                Err(ConfigError::Parse(err))
            }
        }
    }
}

/// Parses and validates a config document. Rules run in order; the first
/// failure is returned.
pub fn validate_config(data: &str) -> Result<ServerConfig, ConfigError> {
    check_duplicate_keys(data)?;
    let config: ServerConfig = serde_json::from_str(data)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v() -> &'static str {
        SERVER_CONFIG_VERSION
    }

    // The validator table: (config JSON, should pass).
    fn cases() -> Vec<(String, bool)> {
        let v = v();
        vec![
            // wrong json
            ("{".to_string(), false),
            // empty json
            ("{}".to_string(), false),
            // wrong config version
            (r#"{"version": "10"}"#.to_string(), false),
            // wrong browser parameter
            (format!(r#"{{"version": "{v}", "browser": "foo"}}"#), false),
            // missing credential
            (format!(r#"{{"version": "{v}", "browser": "on"}}"#), false),
            // missing secret key
            (
                format!(r#"{{"version": "{v}", "browser": "on", "credential" : {{"accessKey":"ferrofs", "secretKey":""}}}}"#),
                false,
            ),
            // missing region should pass, defaults to us-east-1
            (
                format!(r#"{{"version": "{v}", "browser": "on", "credential" : {{"accessKey":"ferrofs", "secretKey":"ferrofs123"}}}}"#),
                true,
            ),
            // missing browser should pass, defaults to on
            (
                format!(r#"{{"version": "{v}", "region": "us-east-1", "credential" : {{"accessKey":"ferrofs", "secretKey":"ferrofs123"}}}}"#),
                true,
            ),
            // success
            (
                format!(r#"{{"version": "{v}", "browser": "on", "region":"us-east-1", "credential" : {{"accessKey":"ferrofs", "secretKey":"ferrofs123"}}}}"#),
                true,
            ),
            // duplicated json keys
            (
                format!(r#"{{"version": "{v}", "browser": "on", "browser": "on", "region":"us-east-1", "credential" : {{"accessKey":"ferrofs", "secretKey":"ferrofs123"}}}}"#),
                false,
            ),
            // AMQP with empty url
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "amqp": {{ "1": {{ "enable": true, "url": "", "exchange": "", "routingKey": "", "exchangeType": "", "mandatory": false, "durable": false }}}}}}}}"#
                ),
                false,
            ),
            // NATS with empty address
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "nats": {{ "1": {{ "enable": true, "address": "", "subject": "", "username": "", "password": "" }} }}}}}}"#
                ),
                false,
            ),
            // Elasticsearch with empty url and index
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "elasticsearch": {{ "1": {{ "enable": true, "url": "", "index": "" }} }}}}}}"#
                ),
                false,
            ),
            // Redis with empty address and key
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "redis": {{ "1": {{ "enable": true, "address": "", "password": "", "key": "" }} }}}}}}"#
                ),
                false,
            ),
            // PostgreSQL with empty host
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "postgresql": {{ "1": {{ "enable": true, "connectionString": "", "table": "", "host": "", "port": "", "user": "", "password": "", "database": "" }}}}}}}}"#
                ),
                false,
            ),
            // Kafka with null brokers
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "kafka": {{ "1": {{ "enable": true, "brokers": null, "topic": "" }} }}}}}}"#
                ),
                false,
            ),
            // Webhook with empty endpoint
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "webhook": {{ "1": {{ "enable": true, "endpoint": "" }} }}}}}}"#
                ),
                false,
            ),
            // MySQL with empty host
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "mysql": {{ "1": {{ "enable": true, "dsnString": "",  "table": "", "host": "", "port": "", "user": "", "password": "", "database": "" }}}}}}}}"#
                ),
                false,
            ),
            // invalid format for MySQL
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "mysql": {{ "1": {{ "enable": true, "dsnString": "",  "format": "invalid", "table": "xxx", "host": "10.0.0.1", "port": "3306", "user": "abc", "password": "pqr", "database": "test1" }}}}}}}}"#
                ),
                false,
            ),
            // valid format for MySQL
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "mysql": {{ "1": {{ "enable": true, "dsnString": "",  "format": "namespace", "table": "xxx", "host": "10.0.0.1", "port": "3306", "user": "abc", "password": "pqr", "database": "test1" }}}}}}}}"#
                ),
                true,
            ),
            // invalid format for PostgreSQL
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "postgresql": {{ "1": {{ "enable": true, "connectionString": "", "format": "invalid", "table": "xxx", "host": "myhost", "port": "5432", "user": "abc", "password": "pqr", "database": "test1" }}}}}}}}"#
                ),
                false,
            ),
            // valid format for PostgreSQL
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "postgresql": {{ "1": {{ "enable": true, "connectionString": "", "format": "namespace", "table": "xxx", "host": "myhost", "port": "5432", "user": "abc", "password": "pqr", "database": "test1" }}}}}}}}"#
                ),
                true,
            ),
            // invalid format for Elasticsearch
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "elasticsearch": {{ "1": {{ "enable": true, "format": "invalid", "url": "example.com", "index": "myindex" }} }}}}}}"#
                ),
                false,
            ),
            // valid format for Elasticsearch
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "elasticsearch": {{ "1": {{ "enable": true, "format": "namespace", "url": "example.com", "index": "myindex" }} }}}}}}"#
                ),
                true,
            ),
            // invalid format for Redis
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "redis": {{ "1": {{ "enable": true, "format": "invalid", "address": "example.com:80", "password": "xxx", "key": "key1" }} }}}}}}"#
                ),
                false,
            ),
            // valid format for Redis
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "redis": {{ "1": {{ "enable": true, "format": "namespace", "address": "example.com:80", "password": "xxx", "key": "key1" }} }}}}}}"#
                ),
                true,
            ),
            // MQTT with empty broker and topic
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "mqtt": {{ "1": {{ "enable": true, "broker": "",  "topic": "", "qos": 0, "username": "", "password": "" }}}}}}}}"#
                ),
                false,
            ),
            // NSQ with empty nsqdAddress and topic
            (
                format!(
                    r#"{{"version": "{v}", "credential": {{ "accessKey": "ferrofs", "secretKey": "ferrofs123" }}, "region": "us-east-1", "browser": "on", "notify": {{ "nsq": {{ "1": {{ "enable": true, "nsqdAddress": "", "topic": "" }} }}}}}}"#
                ),
                false,
            ),
        ]
    }

    #[test]
    fn test_validate_config_table() {
        for (i, (data, should_pass)) in cases().into_iter().enumerate() {
            let result = validate_config(&data);
            if should_pass {
                assert!(result.is_ok(), "case {} should pass, got {:?}", i + 1, result.err());
            } else {
                assert!(result.is_err(), "case {} should fail", i + 1);
            }
        }
    }

    #[test]
    fn test_region_defaults() {
        let config = validate_config(&format!(
            r#"{{"version": "{}", "credential": {{"accessKey":"k","secretKey":"s"}}}}"#,
            v()
        ))
        .unwrap();
        assert_eq!(config.region(), DEFAULT_REGION);
        assert!(config.browser_enabled());
        assert!(!config.worm_enabled());
    }

    #[test]
    fn test_duplicate_key_reported() {
        let err = validate_config(r#"{"version": "1", "version": "1"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(key) if key == "version"));
    }

    #[test]
    fn test_nested_duplicate_key_reported() {
        let data = format!(
            r#"{{"version": "{}", "credential": {{"accessKey":"k","accessKey":"k","secretKey":"s"}}}}"#,
            v()
        );
        assert!(matches!(validate_config(&data), Err(ConfigError::DuplicateKey(_))));
    }

    #[test]
    fn test_disabled_target_not_validated() {
        let data = format!(
            r#"{{"version": "{}", "credential": {{"accessKey":"k","secretKey":"s"}}, "notify": {{ "webhook": {{ "1": {{ "enable": false, "endpoint": "" }} }} }}}}"#,
            v()
        );
        assert!(validate_config(&data).is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::new_default("admin", "password");
        config.validate().unwrap();
        let data = serde_json::to_string(&config).unwrap();
        validate_config(&data).unwrap();
    }
}
