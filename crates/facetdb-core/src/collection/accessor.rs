use crate::{
    collection::{Collection, QueryOptions},
    error::Error,
    record::Record,
};
use serde_json::{Map, Value};

///
/// AccessorMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessorMode {
    /// `allBy<Facets>`: every match.
    All,
    /// `findBy<Facets>`: first match.
    Find,
}

///
/// AccessorResult
///

#[derive(Debug)]
pub enum AccessorResult {
    Many(Vec<Record>),
    One(Option<Record>),
}

impl AccessorResult {
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => record.into_iter().collect(),
        }
    }
}

impl Collection {
    /// Names of the generated `allBy…` / `findBy…` accessors.
    #[must_use]
    pub fn accessor_names(&self) -> Vec<String> {
        self.bindings().index_accessors.keys().cloned().collect()
    }

    /// Names of the relationship accessors records of this entity expose.
    #[must_use]
    pub fn relationship_names(&self) -> Vec<String> {
        self.bindings().reference_accessors.keys().cloned().collect()
    }

    /// Invoke a generated index accessor with one positional argument per
    /// facet, e.g. `allByOrganizationIdAndStatus(orgId, "LIVE")`.
    pub async fn call_accessor(
        &self,
        name: &str,
        args: Vec<Value>,
        options: &QueryOptions,
    ) -> Result<AccessorResult, Error> {
        const OP: &str = "call_accessor";

        let Some(binding) = self.bindings().index_accessors.get(name).cloned() else {
            return Err(self.contract_error(OP, format!("unknown accessor '{name}'")));
        };

        if args.len() != binding.keys.len() {
            return Err(self.contract_error(
                OP,
                format!(
                    "{name} expects {} argument(s) ({}), got {}",
                    binding.keys.len(),
                    binding.keys.join(", "),
                    args.len()
                ),
            ));
        }

        let mut keys = Map::new();
        for (facet, arg) in binding.keys.iter().zip(args) {
            let kind = self.schema().attribute(facet).map(|a| a.kind().clone());
            match kind {
                Some(kind) if !arg.is_null() && kind.matches(&arg) => {
                    keys.insert(facet.clone(), arg);
                }
                Some(kind) => {
                    return Err(self.contract_error(
                        OP,
                        format!("{name}: argument '{facet}' must be of type {kind}"),
                    ));
                }
                None => {
                    return Err(self.contract_error(
                        OP,
                        format!("{name}: '{facet}' is not an attribute"),
                    ));
                }
            }
        }

        match binding.mode {
            AccessorMode::All => {
                let page = self.query_index(OP, &binding.index, keys, options).await?;
                Ok(AccessorResult::Many(page.records))
            }
            AccessorMode::Find => {
                let options = QueryOptions {
                    limit: Some(1),
                    fetch_all_pages: false,
                    ..options.clone()
                };
                let page = self.query_index(OP, &binding.index, keys, &options).await?;
                Ok(AccessorResult::One(page.records.into_iter().next()))
            }
        }
    }
}
