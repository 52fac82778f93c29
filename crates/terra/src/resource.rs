//! Workspace resources
//!
//! A resource is a common record plus a tagged, type-specific payload.
//! Resolution is a pure function of the record: no remote calls.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use terra_core::{Result, TerraError};
use uuid::Uuid;

/// Prefix of every per-resource environment variable
pub const ENV_PREFIX: &str = "TERRA_";

/// Who owns the lifecycle of the backing cloud object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stewardship {
    Controlled,
    Referenced,
}

impl std::fmt::Display for Stewardship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Controlled => write!(f, "CONTROLLED"),
            Self::Referenced => write!(f, "REFERENCED"),
        }
    }
}

/// What happens to a resource when its workspace is duplicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloningPolicy {
    CopyNothing,
    CopyReference,
    CopyResource,
    Reference,
}

/// Type-specific attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "resourceType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ResourceKind {
    GcsBucket {
        bucket_name: String,
    },
    GcsObject {
        bucket_name: String,
        object_name: String,
    },
    BqDataset {
        project_id: String,
        dataset_id: String,
    },
    BqTable {
        project_id: String,
        dataset_id: String,
        table_id: String,
    },
    AiNotebook {
        project_id: String,
        location: String,
        instance_id: String,
    },
    GitRepo {
        git_repo_url: String,
    },
}

/// Separator between project and dataset in BigQuery paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BqPathFormat {
    /// `project.dataset`, as used in SQL
    #[default]
    Sql,
    /// `project:dataset`, as used by the bq command line
    Legacy,
}

/// Knobs for [`Resource::resolve_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Drop the `gs://` scheme from bucket and object paths
    pub exclude_bucket_prefix: bool,
    pub bq_format: BqPathFormat,
}

impl ResourceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GcsBucket { .. } => "GCS_BUCKET",
            Self::GcsObject { .. } => "GCS_OBJECT",
            Self::BqDataset { .. } => "BQ_DATASET",
            Self::BqTable { .. } => "BQ_TABLE",
            Self::AiNotebook { .. } => "AI_NOTEBOOK",
            Self::GitRepo { .. } => "GIT_REPO",
        }
    }

    pub fn supports(&self, stewardship: Stewardship) -> bool {
        match self {
            Self::GcsBucket { .. } | Self::BqDataset { .. } => true,
            Self::AiNotebook { .. } => stewardship == Stewardship::Controlled,
            Self::GcsObject { .. } | Self::BqTable { .. } | Self::GitRepo { .. } => {
                stewardship == Stewardship::Referenced
            }
        }
    }

    pub fn resolve_with(&self, options: &ResolveOptions) -> String {
        let gs = if options.exclude_bucket_prefix { "" } else { "gs://" };
        let bq_sep = match options.bq_format {
            BqPathFormat::Sql => '.',
            BqPathFormat::Legacy => ':',
        };
        match self {
            Self::GcsBucket { bucket_name } => format!("{}{}", gs, bucket_name),
            Self::GcsObject {
                bucket_name,
                object_name,
            } => format!("{}{}/{}", gs, bucket_name, object_name),
            Self::BqDataset {
                project_id,
                dataset_id,
            } => format!("{}{}{}", project_id, bq_sep, dataset_id),
            Self::BqTable {
                project_id,
                dataset_id,
                table_id,
            } => format!("{}{}{}.{}", project_id, bq_sep, dataset_id, table_id),
            Self::AiNotebook {
                project_id,
                location,
                instance_id,
            } => format!(
                "projects/{}/locations/{}/instances/{}",
                project_id, location, instance_id
            ),
            Self::GitRepo { git_repo_url } => git_repo_url.clone(),
        }
    }
}

/// A resource as stored by the workspace service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub stewardship: Stewardship,
    pub cloning_policy: CloningPolicy,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl Resource {
    /// Tool-usable identifier with default options
    pub fn resolve(&self) -> String {
        self.kind.resolve_with(&ResolveOptions::default())
    }

    pub fn resolve_with(&self, options: &ResolveOptions) -> String {
        self.kind.resolve_with(options)
    }

    /// The `TERRA_<NAME>` variable this resource is exported as
    pub fn env_key(&self) -> String {
        env_key(&self.name)
    }

    pub fn is_controlled(&self) -> bool {
        self.stewardship == Stewardship::Controlled
    }
}

/// A resource to be created in a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub stewardship: Stewardship,
    pub cloning_policy: CloningPolicy,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl ResourceRequest {
    pub fn referenced(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            stewardship: Stewardship::Referenced,
            cloning_policy: CloningPolicy::CopyReference,
            kind,
        }
    }

    pub fn controlled(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            stewardship: Stewardship::Controlled,
            cloning_policy: CloningPolicy::CopyNothing,
            kind,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_cloning_policy(mut self, policy: CloningPolicy) -> Self {
        self.cloning_policy = policy;
        self
    }

    /// Check the name and that the kind supports the requested stewardship
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if !self.kind.supports(self.stewardship) {
            return Err(TerraError::InvalidInput(format!(
                "{} resources cannot be {}",
                self.kind.type_name(),
                self.stewardship
            )));
        }
        Ok(())
    }
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("name regex must compile"))
}

/// Resource names double as environment variable suffixes
pub fn validate_name(name: &str) -> Result<()> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(TerraError::InvalidInput(format!(
            "Invalid resource name '{}': only letters, numbers and underscores are allowed",
            name
        )))
    }
}

/// `TERRA_` followed by the upper-cased name, non-alphanumerics replaced with `_`
pub fn env_key(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", ENV_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> Resource {
        Resource {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            stewardship: Stewardship::Controlled,
            cloning_policy: CloningPolicy::CopyResource,
            kind: ResourceKind::GcsBucket {
                bucket_name: "my-bucket".to_string(),
            },
        }
    }

    #[test]
    fn test_resolve_formats() {
        let no_prefix = ResolveOptions {
            exclude_bucket_prefix: true,
            ..Default::default()
        };
        assert_eq!(bucket("b").resolve(), "gs://my-bucket");
        assert_eq!(bucket("b").resolve_with(&no_prefix), "my-bucket");

        let object = ResourceKind::GcsObject {
            bucket_name: "bkt".to_string(),
            object_name: "dir/file.txt".to_string(),
        };
        assert_eq!(
            object.resolve_with(&ResolveOptions::default()),
            "gs://bkt/dir/file.txt"
        );

        let table = ResourceKind::BqTable {
            project_id: "proj".to_string(),
            dataset_id: "ds".to_string(),
            table_id: "t".to_string(),
        };
        let legacy = ResolveOptions {
            bq_format: BqPathFormat::Legacy,
            ..Default::default()
        };
        assert_eq!(table.resolve_with(&ResolveOptions::default()), "proj.ds.t");
        assert_eq!(table.resolve_with(&legacy), "proj:ds.t");

        let notebook = ResourceKind::AiNotebook {
            project_id: "proj".to_string(),
            location: "us-central1-a".to_string(),
            instance_id: "nb".to_string(),
        };
        assert_eq!(
            notebook.resolve_with(&ResolveOptions::default()),
            "projects/proj/locations/us-central1-a/instances/nb"
        );
    }

    #[test]
    fn test_resolve_is_pure() {
        // Same attributes, different identity: same answer, no network involved
        let a = bucket("first");
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        b.stewardship = Stewardship::Referenced;
        assert_eq!(a.resolve(), b.resolve());
        assert_eq!(a.resolve(), a.resolve());
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("my_bucket"), "TERRA_MY_BUCKET");
        assert_eq!(env_key("data-set.1"), "TERRA_DATA_SET_1");
        assert_eq!(bucket("Reads2").env_key(), "TERRA_READS2");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("good_name_1").is_ok());
        assert!(matches!(
            validate_name("bad-name"),
            Err(TerraError::InvalidInput(_))
        ));
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_stewardship_support() {
        let notebook = ResourceKind::AiNotebook {
            project_id: "p".to_string(),
            location: "l".to_string(),
            instance_id: "i".to_string(),
        };
        let request = ResourceRequest::referenced("nb", notebook);
        assert!(matches!(request.validate(), Err(TerraError::InvalidInput(_))));

        let repo = ResourceKind::GitRepo {
            git_repo_url: "https://github.com/org/repo.git".to_string(),
        };
        assert!(ResourceRequest::referenced("repo", repo.clone()).validate().is_ok());
        assert!(ResourceRequest::controlled("repo", repo).validate().is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "id": "6f3c1c1e-2d7e-4bb5-9b8e-0c1c9c1d2e3f",
            "name": "reads",
            "stewardship": "REFERENCED",
            "cloningPolicy": "COPY_REFERENCE",
            "resourceType": "GCS_OBJECT",
            "bucketName": "bkt",
            "objectName": "reads.bam"
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.stewardship, Stewardship::Referenced);
        assert_eq!(resource.kind.type_name(), "GCS_OBJECT");
        assert_eq!(resource.resolve(), "gs://bkt/reads.bam");
    }
}
