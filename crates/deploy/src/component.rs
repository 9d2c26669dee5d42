//! Deployable components, their constructor arguments and the fixed plans
//! that order them.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{ConfigValues, DeployError, LedgerSlice};

/// One constructor (or setter) argument, resolved just before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDescriptor {
    /// A literal value, coerced against the ABI parameter type at encoding time.
    Literal(String),
    /// The address of a component deployed earlier on the same target.
    ComponentRef(String),
    /// A shared configuration value.
    ConfigRef(String),
}

impl ArgDescriptor {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self::ComponentRef(name.into())
    }

    pub fn config(key: impl Into<String>) -> Self {
        Self::ConfigRef(key.into())
    }

    /// Resolve this descriptor to its textual value.
    ///
    /// `owner` names the component the argument belongs to and is only used
    /// in errors.
    pub fn resolve(
        &self,
        owner: &str,
        ledger: &LedgerSlice,
        config: &ConfigValues,
    ) -> Result<String, DeployError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::ComponentRef(name) => ledger
                .get(name)
                .map(|address| address.to_checksum(None))
                .ok_or_else(|| DeployError::MissingDependency {
                    component: owner.to_string(),
                    dependency: name.clone(),
                }),
            Self::ConfigRef(key) => {
                config
                    .get(key)
                    .cloned()
                    .ok_or_else(|| DeployError::MissingConfig {
                        component: owner.to_string(),
                        key: key.clone(),
                    })
            }
        }
    }
}

/// A named deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Ledger key of the component.
    pub name: String,
    /// Name of the compiled contract artifact.
    pub contract: String,
    /// Source path the artifact was compiled from.
    pub source: String,
    pub args: Vec<ArgDescriptor>,
}

impl Component {
    /// A component whose ledger name and contract name coincide.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            contract: name.clone(),
            name,
            source: source.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ArgDescriptor) -> Self {
        self.args.push(arg);
        self
    }

    /// Resolve every argument, failing on the first unresolved reference.
    pub fn resolve_args(
        &self,
        ledger: &LedgerSlice,
        config: &ConfigValues,
    ) -> Result<Vec<String>, DeployError> {
        self.args
            .iter()
            .map(|arg| arg.resolve(&self.name, ledger, config))
            .collect()
    }
}

/// Wiring that is established after deployment through a setter call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    /// Component exposing the getter/setter pair.
    pub component: String,
    pub getter: String,
    pub setter: String,
    /// Desired value; must resolve to an address.
    pub value: ArgDescriptor,
}

impl Setting {
    /// Resolve the desired value to an address.
    pub fn desired(
        &self,
        ledger: &LedgerSlice,
        config: &ConfigValues,
    ) -> Result<Address, DeployError> {
        let raw = self.value.resolve(&self.component, ledger, config)?;
        raw.parse::<Address>()
            .map_err(|e| DeployError::InvalidArgument {
                component: self.component.clone(),
                reason: format!("`{raw}` passed to `{}` is not an address: {e}", self.setter),
            })
    }
}

/// One step of a fixed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Deploy(Component),
    Reconcile(Setting),
}

impl Step {
    /// Name used for this step in logs and reports.
    pub fn label(&self) -> String {
        match self {
            Step::Deploy(component) => component.name.clone(),
            Step::Reconcile(setting) => format!("{}.{}", setting.component, setting.setter),
        }
    }
}

/// A hand-ordered sequence of steps. The order is the dependency order and is
/// never rearranged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub steps: Vec<Step>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(mut self, component: Component) -> Self {
        self.steps.push(Step::Deploy(component));
        self
    }

    pub fn reconcile(
        mut self,
        component: impl Into<String>,
        getter: impl Into<String>,
        setter: impl Into<String>,
        value: ArgDescriptor,
    ) -> Self {
        self.steps.push(Step::Reconcile(Setting {
            component: component.into(),
            getter: getter.into(),
            setter: setter.into(),
            value,
        }));
        self
    }

    /// Components deployed by this plan, in order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.steps.iter().filter_map(|step| match step {
            Step::Deploy(component) => Some(component),
            Step::Reconcile(_) => None,
        })
    }
}
