//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (derive 的 `Validate`)：宽高 > 0、sampling_time >= 0、队列容量 > 0 等
//! - sampling_time 必须是有限值
//! - replay 源必须提供 replay_path
//! - sink 名称唯一，network sink 必须提供 addr
//!
//! 降采样因子不做校验：<= 0 时由处理器归一化为 1。

use std::collections::HashSet;

use contracts::{ContractError, DriverConfig, SinkType, SourceKind};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 DriverConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &DriverConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_sampling_time(config)?;
    validate_source(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// 字段级约束，按字段路径排序后取第一个违规
fn validate_fields(config: &DriverConfig) -> Result<(), ContractError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation("", &errors)
                .unwrap_or_else(|| ("<root>".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

fn first_violation(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(violations) => {
                if let Some(violation) = violations.first() {
                    let message = violation
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| violation.code.to_string());
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(&path, inner) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(&format!("{path}[{idx}]"), inner) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

/// NaN / inf 能通过 range 约束，这里单独拦截
fn validate_sampling_time(config: &DriverConfig) -> Result<(), ContractError> {
    let sampling_time = config.depth.sampling_time;
    if !sampling_time.is_finite() {
        return Err(ContractError::config_validation(
            "depth.sampling_time",
            format!("sampling_time must be finite, got {sampling_time}"),
        ));
    }
    Ok(())
}

/// 校验帧源配置
fn validate_source(config: &DriverConfig) -> Result<(), ContractError> {
    let source = &config.source;
    if !source.frame_rate_hz.is_finite() {
        return Err(ContractError::config_validation(
            "source.frame_rate_hz",
            format!("frame_rate_hz must be finite, got {}", source.frame_rate_hz),
        ));
    }
    if source.kind == SourceKind::Replay && source.replay_path.is_none() {
        return Err(ContractError::config_validation(
            "source.replay_path",
            "replay source requires replay_path",
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(config: &DriverConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.sink_type == SinkType::Network && !sink.params.contains_key("addr") {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].params.addr"),
                "network sink requires 'addr'",
            ));
        }
    }
    Ok(())
}
