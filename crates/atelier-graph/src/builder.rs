use serde::{Deserialize, Serialize};
use tracing::debug;

use atelier_core::types::{StepDescriptor, StepKind};

/// Unstructured input describing desired work, keyed by a family
/// discriminator. Extra fields are carried along untouched; this is a
/// data-mapping step, not a validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Brief {
    /// Task family discriminator (e.g. "logo", "code").
    #[serde(default, rename = "taskFamily")]
    pub task_family: String,
    /// Family-specific fields, kept opaque.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Brief {
    pub fn new(task_family: impl Into<String>) -> Self {
        Self {
            task_family: task_family.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attach a family-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// The brief's params as a single JSON object (family included).
    pub fn to_params(&self) -> serde_json::Value {
        let mut map = self.fields.clone();
        map.insert(
            "taskFamily".into(),
            serde_json::Value::String(self.task_family.clone()),
        );
        serde_json::Value::Object(map)
    }
}

/// Build the canonical step chain for a brief.
///
/// Deterministic for a given family: recognized families yield a fixed chain
/// bracketed by a start node (no dependencies) and an end node depending on
/// the last substantive step. Unrecognized families fall back to a minimal
/// start → process → end chain.
pub fn build_steps(brief: &Brief) -> Vec<StepDescriptor> {
    let steps = match brief.task_family.as_str() {
        "logo" => vec![
            StepDescriptor::new("start", StepKind::Start, "Start task"),
            StepDescriptor::new("analyze_brief", StepKind::Process, "Analyze brief")
                .with_description("Analyze the logo design brief")
                .depends_on("start"),
            StepDescriptor::new("generate_concepts", StepKind::Process, "Generate concepts")
                .with_description("Generate logo concept directions")
                .depends_on("analyze_brief"),
            StepDescriptor::new("create_logo", StepKind::Process, "Create logo")
                .with_description("Create the logo from the chosen concept")
                .depends_on("generate_concepts"),
            StepDescriptor::new("generate_colors", StepKind::Process, "Generate colors")
                .with_description("Generate a color palette for the logo")
                .depends_on("create_logo"),
            StepDescriptor::new("end", StepKind::End, "End task").depends_on("generate_colors"),
        ],
        "code" => vec![
            StepDescriptor::new("start", StepKind::Start, "Start task"),
            StepDescriptor::new("analyze_requirements", StepKind::Process, "Analyze requirements")
                .with_description("Analyze the code generation requirements")
                .depends_on("start"),
            StepDescriptor::new("design_architecture", StepKind::Process, "Design architecture")
                .with_description("Design the code architecture")
                .depends_on("analyze_requirements"),
            StepDescriptor::new("generate_code", StepKind::Process, "Generate code")
                .with_description("Generate the implementation")
                .depends_on("design_architecture"),
            StepDescriptor::new("test_code", StepKind::Process, "Test code")
                .with_description("Test the generated code")
                .depends_on("generate_code"),
            StepDescriptor::new("end", StepKind::End, "End task").depends_on("test_code"),
        ],
        other => {
            debug!(task_family = %other, "Unrecognized task family, using default chain");
            vec![
                StepDescriptor::new("start", StepKind::Start, "Start task"),
                StepDescriptor::new("process", StepKind::Process, "Process task")
                    .with_description("Process the request")
                    .depends_on("start"),
                StepDescriptor::new("end", StepKind::End, "End task").depends_on("process"),
            ]
        }
    };

    debug!(task_family = %brief.task_family, steps = steps.len(), "Built step chain");
    steps
}
