use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    RequiredFileMissing,
    MetadataMissing,
    MetadataInvalid,

    TemplateInvalid,

    TagCollision,
    TagAlreadyPublished,

    RevisionInvalid,
    ChangeResolutionFailed,
    RemoteCompareFailed,
    RemoteResponseInvalid,

    StageLintFailed,
    StageBuildFailed,
    StageScanFailed,
    StagePushFailed,
    StageSaveFailed,

    GitCommandFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::RequiredFileMissing => "stage.required_file_missing",
            ErrorCode::MetadataMissing => "metadata.missing",
            ErrorCode::MetadataInvalid => "metadata.invalid",

            ErrorCode::TemplateInvalid => "template.invalid",

            ErrorCode::TagCollision => "tags.collision",
            ErrorCode::TagAlreadyPublished => "tags.already_published",

            ErrorCode::RevisionInvalid => "changes.revision_invalid",
            ErrorCode::ChangeResolutionFailed => "changes.resolution_failed",
            ErrorCode::RemoteCompareFailed => "changes.remote_compare_failed",
            ErrorCode::RemoteResponseInvalid => "changes.remote_response_invalid",

            ErrorCode::StageLintFailed => "stage.lint_failed",
            ErrorCode::StageBuildFailed => "stage.build_failed",
            ErrorCode::StageScanFailed => "stage.scan_failed",
            ErrorCode::StagePushFailed => "stage.push_failed",
            ErrorCode::StageSaveFailed => "stage.save_failed",

            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// True for errors scoped to a single image folder: they mark that folder
    /// failed but never abort sibling folders.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            ErrorCode::RequiredFileMissing
                | ErrorCode::MetadataMissing
                | ErrorCode::MetadataInvalid
                | ErrorCode::TagCollision
                | ErrorCode::TagAlreadyPublished
                | ErrorCode::StageLintFailed
                | ErrorCode::StageBuildFailed
                | ErrorCode::StageScanFailed
                | ErrorCode::StagePushFailed
                | ErrorCode::StageSaveFailed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDetails {
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCollisionDetails {
    pub tag: String,
    pub folder: String,
    pub owned_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailedDetails {
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            serde_json::json!({ "args": args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let details = serde_json::to_value(ConfigMissingKeyDetails {
            key: key.into(),
            path,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn required_file_missing(folder: impl Into<String>, file: impl Into<String>) -> Self {
        let file = file.into();
        Self::new(
            ErrorCode::RequiredFileMissing,
            format!("{} not found!", file),
            serde_json::json!({ "folder": folder.into(), "file": file }),
        )
    }

    pub fn metadata_missing(folder: impl Into<String>, problem: impl Into<String>) -> Self {
        let details = serde_json::to_value(MetadataDetails {
            folder: folder.into(),
            field: None,
            problem: problem.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::MetadataMissing, "Metadata not found", details)
    }

    pub fn metadata_invalid(
        folder: impl Into<String>,
        field: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = serde_json::to_value(MetadataDetails {
            folder: folder.into(),
            field,
            problem: problem.clone(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::MetadataInvalid, problem, details)
    }

    pub fn template_invalid(template: impl Into<String>, problem: impl Into<String>) -> Self {
        let template = template.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::TemplateInvalid,
            format!("Invalid tag template '{}': {}", template, problem),
            serde_json::json!({ "template": template, "problem": problem }),
        )
    }

    pub fn tag_collision(
        tag: impl Into<String>,
        folder: impl Into<String>,
        owned_by: impl Into<String>,
    ) -> Self {
        let tag = tag.into();
        let folder = folder.into();
        let owned_by = owned_by.into();
        let details = serde_json::to_value(TagCollisionDetails {
            tag: tag.clone(),
            folder: folder.clone(),
            owned_by: owned_by.clone(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::TagCollision,
            format!("Tag '{}' is already claimed by '{}'", tag, owned_by),
            details,
        )
        .with_hint(
            "Two folders publishing the same tag is undefined behavior for consumers; \
             bump the version or rename the conflicting tag in one of them",
        )
    }

    pub fn tag_already_published(tag: impl Into<String>, folder: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::new(
            ErrorCode::TagAlreadyPublished,
            format!("{} already exists, stopping...", tag),
            serde_json::json!({ "tag": tag, "folder": folder.into() }),
        )
        .with_hint(
            "Overriding an existing version of an image is dangerous; increment the \
             version in metadata.yml instead",
        )
        .with_hint("If you know what you are doing, re-run with --force to republish")
    }

    pub fn revision_invalid(revision: impl Into<String>, problem: impl Into<String>) -> Self {
        let revision = revision.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::RevisionInvalid,
            format!("Invalid revision '{}': {}", revision, problem),
            serde_json::json!({ "revision": revision, "problem": problem }),
        )
    }

    pub fn change_resolution_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ChangeResolutionFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn remote_compare_failed(message: impl Into<String>, details: Value) -> Self {
        Self::new(ErrorCode::RemoteCompareFailed, message, details)
    }

    pub fn remote_response_invalid(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RemoteResponseInvalid,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn stage_failed(
        code: ErrorCode,
        folder: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(StageFailedDetails {
            folder: folder.into(),
            exit_code,
            stderr: stderr.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(code, message, details)
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::InternalIoError, "I/O error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_collision_names_tag_and_owner() {
        let err = Error::tag_collision("ghcr.io/x/app:1.2.3", "app-next", "app");
        assert_eq!(err.code, ErrorCode::TagCollision);
        assert!(err.message.contains("ghcr.io/x/app:1.2.3"));
        assert!(err.message.contains("app"));
        assert_eq!(err.details["ownedBy"], "app");
        assert_eq!(err.details["folder"], "app-next");
    }

    #[test]
    fn unit_scoped_codes() {
        assert!(ErrorCode::MetadataInvalid.is_unit_scoped());
        assert!(ErrorCode::TagCollision.is_unit_scoped());
        assert!(ErrorCode::StageLintFailed.is_unit_scoped());
        assert!(!ErrorCode::ConfigMissingKey.is_unit_scoped());
        assert!(!ErrorCode::ChangeResolutionFailed.is_unit_scoped());
    }

    #[test]
    fn error_codes_are_namespaced() {
        assert_eq!(ErrorCode::TagCollision.as_str(), "tags.collision");
        assert_eq!(ErrorCode::StageBuildFailed.as_str(), "stage.build_failed");
        assert_eq!(
            ErrorCode::RemoteCompareFailed.as_str(),
            "changes.remote_compare_failed"
        );
    }

    #[test]
    fn hints_accumulate() {
        let err = Error::git_command_failed("boom")
            .with_hint("first")
            .with_hint("second");
        assert_eq!(err.hints.len(), 2);
        assert_eq!(err.hints[0].message, "first");
    }
}
