// src/classify.rs
//! Keyword classifier: maps announcement text to one category from a fixed
//! taxonomy. Categories are tested in priority order; the first category
//! with a word-boundary keyword hit wins, so a keyword shared by two
//! categories always resolves to the one listed first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed taxonomy for announcements. `Other` is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    AiMl,
    Compute,
    Storage,
    Database,
    Analytics,
    Security,
    Networking,
    #[serde(rename = "DEVTOOLS")]
    DevTools,
    Containers,
    Serverless,
    Other,
}

impl Category {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AiMl => "AI_ML",
            Category::Compute => "COMPUTE",
            Category::Storage => "STORAGE",
            Category::Database => "DATABASE",
            Category::Analytics => "ANALYTICS",
            Category::Security => "SECURITY",
            Category::Networking => "NETWORKING",
            Category::DevTools => "DEVTOOLS",
            Category::Containers => "CONTAINERS",
            Category::Serverless => "SERVERLESS",
            Category::Other => "OTHER",
        }
    }

    /// Parse an exact (case-sensitive) wire name. `ALL` is not a category.
    pub fn from_wire(s: &str) -> Option<Self> {
        ALL_CATEGORIES.iter().copied().find(|c| c.as_str() == s)
    }
}

pub const ALL_CATEGORIES: [Category; 11] = [
    Category::AiMl,
    Category::Compute,
    Category::Storage,
    Category::Database,
    Category::Analytics,
    Category::Security,
    Category::Networking,
    Category::DevTools,
    Category::Containers,
    Category::Serverless,
    Category::Other,
];

/// Priority-ordered keyword table. Earlier rows win on overlap.
const KEYWORD_TABLE: &[(Category, &[&str])] = &[
    (
        Category::AiMl,
        &[
            "sagemaker",
            "bedrock",
            "machine learning",
            "deep learning",
            "generative",
            "inference",
            "ai",
            "ml",
        ],
    ),
    (
        Category::Compute,
        &[
            "ec2",
            "graviton",
            "lightsail",
            "auto scaling",
            "compute",
            "instance",
            "vcpu",
        ],
    ),
    (
        Category::Storage,
        &[
            "s3", "ebs", "efs", "glacier", "storage", "backup", "snapshot", "archive",
        ],
    ),
    (
        Category::Database,
        &[
            "rds",
            "dynamodb",
            "aurora",
            "documentdb",
            "elasticache",
            "neptune",
            "database",
        ],
    ),
    (
        Category::Analytics,
        &[
            "athena",
            "redshift",
            "emr",
            "kinesis",
            "quicksight",
            "glue",
            "data lake",
            "analytics",
        ],
    ),
    (
        Category::Security,
        &[
            "iam",
            "kms",
            "guardduty",
            "waf",
            "shield",
            "encryption",
            "compliance",
            "security",
        ],
    ),
    (
        Category::Networking,
        &[
            "vpc",
            "cloudfront",
            "route 53",
            "load balancer",
            "transit gateway",
            "direct connect",
            "networking",
        ],
    ),
    (
        Category::DevTools,
        &[
            "codebuild",
            "codepipeline",
            "cloudformation",
            "cdk",
            "sdk",
            "cli",
            "toolkit",
            "developer",
        ],
    ),
    (
        Category::Containers,
        &[
            "eks",
            "ecs",
            "fargate",
            "kubernetes",
            "container",
            "docker",
            "ecr",
        ],
    ),
    (
        Category::Serverless,
        &[
            "lambda",
            "serverless",
            "step functions",
            "eventbridge",
            "api gateway",
            "sqs",
            "sns",
        ],
    ),
];

// One compiled alternation per category, in table order. Word boundaries
// keep "ml" from matching inside "html".
static COMPILED_TABLE: Lazy<Vec<(Category, Regex)>> = Lazy::new(|| {
    KEYWORD_TABLE
        .iter()
        .map(|(cat, keywords)| {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"\b(?:{alternation})\b")).expect("keyword regex");
            (*cat, re)
        })
        .collect()
});

/// Classify free text into exactly one category. Pure and infallible.
pub fn classify(text: &str) -> Category {
    let lowered = text.to_lowercase();
    for (cat, re) in COMPILED_TABLE.iter() {
        if re.is_match(&lowered) {
            return *cat;
        }
    }
    Category::Other
}
