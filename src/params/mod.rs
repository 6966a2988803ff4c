//! The session's parameter set.
//!
//! Parameters live in memory for the lifetime of the server process. They can
//! be seeded from a YAML file and are only written back when explicitly
//! exported.

use crate::db::query::DEFAULT_DATE_TOKEN;
use crate::error::{ApiError, ApiResult};
use crate::types::{Parameter, ParameterInput, is_valid_parameter_name};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Ordered, name-unique collection of parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Vec<Parameter>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding [`default_parameters`].
    pub fn with_defaults() -> Self {
        Self {
            params: default_parameters(),
        }
    }

    /// Build a store from YAML entries, validating each one.
    pub fn from_inputs(inputs: Vec<ParameterInput>) -> ApiResult<Self> {
        let mut store = Self::new();
        for input in inputs {
            store.add(input)?;
        }
        Ok(store)
    }

    /// Load a YAML parameters file (a list of `name`/`description`/`sql`).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read parameters file {}", path.display()))?;
        let store = Self::from_yaml(&content)
            .with_context(|| format!("invalid parameters file {}", path.display()))?;
        info!(path = %path.display(), count = store.len(), "Loaded parameters");
        Ok(store)
    }

    pub fn from_yaml(yaml: &str) -> ApiResult<Self> {
        Self::from_inputs(Self::parse_yaml(yaml)?)
    }

    /// Parse a YAML list of parameters without validating it.
    pub fn parse_yaml(yaml: &str) -> ApiResult<Vec<ParameterInput>> {
        serde_yaml::from_str(yaml).map_err(|e| ApiError::invalid_value("parameters", &e.to_string()))
    }

    /// Serialise without ids; ids are session-local.
    pub fn to_yaml(&self) -> Result<String> {
        let inputs: Vec<ParameterInput> = self.params.iter().map(ParameterInput::from).collect();
        Ok(serde_yaml::to_string(&inputs)?)
    }

    pub fn list(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Append a new parameter with a fresh id.
    pub fn add(&mut self, input: ParameterInput) -> ApiResult<Parameter> {
        let input = validate(input)?;
        if self.find_by_name(&input.name).is_some() {
            return Err(ApiError::duplicate_name(&input.name));
        }

        let param = Parameter {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            sql: input.sql,
        };
        debug!(id = %param.id, name = %param.name, "Added parameter");
        self.params.push(param.clone());
        Ok(param)
    }

    /// Replace the fields of an existing parameter, keeping its id and position.
    pub fn update(&mut self, id: &str, input: ParameterInput) -> ApiResult<Parameter> {
        let input = validate(input)?;
        if self
            .params
            .iter()
            .any(|p| p.name == input.name && p.id != id)
        {
            return Err(ApiError::duplicate_name(&input.name));
        }

        let param = self
            .params
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ApiError::parameter_not_found(id))?;
        param.name = input.name;
        param.description = input.description;
        param.sql = input.sql;
        debug!(id = %param.id, name = %param.name, "Updated parameter");
        Ok(param.clone())
    }

    pub fn remove(&mut self, id: &str) -> ApiResult<Parameter> {
        let index = self
            .params
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ApiError::parameter_not_found(id))?;
        let param = self.params.remove(index);
        debug!(id = %param.id, name = %param.name, "Removed parameter");
        Ok(param)
    }

    /// Replace the whole set. Nothing changes if any entry is invalid.
    pub fn replace_all(&mut self, inputs: Vec<ParameterInput>) -> ApiResult<()> {
        let fresh = Self::from_inputs(inputs)?;
        self.params = fresh.params;
        Ok(())
    }
}

/// Trim and check user-supplied fields.
fn validate(input: ParameterInput) -> ApiResult<ParameterInput> {
    let name = input.name.trim().to_string();
    let description = input.description.trim().to_string();
    let sql = input.sql.trim().to_string();

    if name.is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if !is_valid_parameter_name(&name) {
        return Err(ApiError::invalid_value(
            "name",
            "only letters, digits and underscores are allowed",
        ));
    }
    if description.is_empty() {
        return Err(ApiError::missing_field("description"));
    }
    if sql.is_empty() {
        return Err(ApiError::missing_field("sql"));
    }

    Ok(ParameterInput {
        name,
        description,
        sql,
    })
}

/// The starter parameters, written against the sample schema.
pub fn default_parameters() -> Vec<Parameter> {
    let t = DEFAULT_DATE_TOKEN;
    [
        (
            "total_sales",
            "Calculates the total sales amount for the specified month.",
            format!("SELECT SUM(amount) FROM sales WHERE strftime('%Y-%m', sale_date) = '{t}';"),
        ),
        (
            "new_customers",
            "Counts the number of new customers who signed up in the specified month.",
            format!(
                "SELECT COUNT(id) FROM customers WHERE strftime('%Y-%m', signup_date) = '{t}';"
            ),
        ),
        (
            "top_product",
            "Finds the name of the product with the highest sales in the month.",
            format!(
                "SELECT p.name FROM products p \
                 JOIN sales_items si ON p.id = si.product_id \
                 JOIN sales s ON si.sale_id = s.id \
                 WHERE strftime('%Y-%m', s.sale_date) = '{t}' \
                 GROUP BY p.name ORDER BY SUM(si.quantity) DESC LIMIT 1;"
            ),
        ),
    ]
    .into_iter()
    .map(|(name, description, sql)| Parameter {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        sql,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn input(name: &str) -> ParameterInput {
        ParameterInput::new(name, "some value", "SELECT 1")
    }

    #[test]
    fn add_trims_and_assigns_ids() {
        let mut store = ParameterStore::new();
        let a = store
            .add(ParameterInput::new("  total ", " sum ", " SELECT 1 "))
            .unwrap();
        let b = store.add(input("other")).unwrap();

        assert_eq!(a.name, "total");
        assert_eq!(a.description, "sum");
        assert_eq!(a.sql, "SELECT 1");
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut store = ParameterStore::new();
        let first = store.add(input("total")).unwrap();
        let err = store.add(input("total")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);

        // Case-sensitive
        store.add(input("Total")).unwrap();

        let second = store.add(input("other")).unwrap();
        let err = store.update(&second.id, input("total")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);

        // Renaming to its own name is fine
        store.update(&first.id, input("total")).unwrap();
    }

    #[test]
    fn validation_errors_name_field() {
        let mut store = ParameterStore::new();

        let err = store.add(input("")).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
        assert_eq!(err.field.as_deref(), Some("name"));

        let err = store.add(input("total sales")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);

        let err = store
            .add(ParameterInput::new("total", "desc", "   "))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("sql"));
        assert!(store.is_empty());
    }

    #[test]
    fn update_keeps_position_and_remove() {
        let mut store = ParameterStore::new();
        let a = store.add(input("a")).unwrap();
        store.add(input("b")).unwrap();

        let updated = store
            .update(&a.id, ParameterInput::new("renamed", "d", "SELECT 2"))
            .unwrap();
        assert_eq!(updated.id, a.id);
        assert_eq!(store.list()[0].name, "renamed");

        let err = store.update("missing", input("x")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParameterNotFound);

        store.remove(&a.id).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&a.id).is_none());
        assert_eq!(
            store.remove(&a.id).unwrap_err().code,
            ErrorCode::ParameterNotFound
        );
    }

    #[test]
    fn replace_all_is_atomic() {
        let mut store = ParameterStore::with_defaults();
        let err = store
            .replace_all(vec![input("x"), input("x")])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
        assert_eq!(store.len(), 3);

        store.replace_all(vec![input("x")]).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn yaml_round_trip_drops_ids() {
        let store = ParameterStore::with_defaults();
        let yaml = store.to_yaml().unwrap();
        assert!(!yaml.contains("id:"));
        assert!(yaml.contains("[REPORT_DATE]"));

        let loaded = ParameterStore::from_yaml(&yaml).unwrap();
        let names: Vec<_> = loaded.list().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["total_sales", "new_customers", "top_product"]);
    }

    #[test]
    fn load_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.yaml");
        std::fs::write(
            &path,
            "- name: revenue\n  description: Revenue\n  sql: SELECT 1\n",
        )
        .unwrap();

        let store = ParameterStore::load(&path).unwrap();
        assert_eq!(store.list()[0].name, "revenue");
        assert_eq!(store.len(), 1);

        std::fs::write(&path, "- name: bad name\n  description: d\n  sql: s\n").unwrap();
        assert!(ParameterStore::load(&path).is_err());
    }
}
