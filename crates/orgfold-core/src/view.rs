//! The materialized related-organisation view: one row per identity
//! component, rebuilt wholesale by each rebuild pass.

use serde::{Deserialize, Serialize};

use crate::{Orgid, record::Address};

/// The canonical, merged profile of one real organisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedOrganisation {
  pub org_id:                    Orgid,
  /// Every identifier in the component, sorted.
  pub org_ids:                   Vec<Orgid>,
  /// `org_id` of each member record, in priority order.
  pub members:                   Vec<Orgid>,
  pub name:                      String,
  pub alternate_names:           Vec<String>,
  pub active:                    bool,
  pub organisation_types:        Vec<String>,
  pub organisation_type_primary: String,
  /// Address of the top-priority member.
  pub address:                   Address,
  pub domains:                   Vec<String>,
  pub locations:                 Vec<String>,
  pub sources:                   Vec<String>,
  pub importance:                f64,
}

/// Parameters for [`RegistryStore::list_related`](crate::store::RegistryStore::list_related).
#[derive(Debug, Clone, Default)]
pub struct RelatedQuery {
  /// Only rows tagged with this type slug.
  pub organisation_type: Option<String>,
  pub active:            Option<bool>,
  pub limit:             Option<usize>,
  pub offset:            Option<usize>,
}

/// Everything a rebuild writes in one publication.
#[derive(Debug, Clone, Default)]
pub struct ViewPublication {
  /// View version the rebuild's snapshot was read at.
  pub based_on:    i64,
  pub rows:        Vec<RelatedOrganisation>,
  /// Component identifier list for each record, keyed by `record_id`.
  pub linked_orgs: Vec<(i64, Vec<Orgid>)>,
}
