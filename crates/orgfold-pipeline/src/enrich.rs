//! Per-source enrichment plugins, applied to every batch of records before it
//! is written.

use std::collections::{HashMap, HashSet};

use orgfold_core::record::NewOrganisation;

use crate::Result;

pub trait Enrichment: Send + Sync {
  /// Short name used in logs and errors.
  fn name(&self) -> &'static str;

  fn apply(&self, records: Vec<NewOrganisation>) -> Result<Vec<NewOrganisation>>;
}

/// Enrichments keyed by spider, applied in registration order.
#[derive(Default)]
pub struct EnrichmentRegistry {
  by_spider: HashMap<String, Vec<Box<dyn Enrichment>>>,
}

impl EnrichmentRegistry {
  pub fn register(&mut self, spider: impl Into<String>, plugin: Box<dyn Enrichment>) {
    self.by_spider.entry(spider.into()).or_default().push(plugin);
  }

  pub fn for_spider(&self, spider: &str) -> &[Box<dyn Enrichment>] {
    self.by_spider.get(spider).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn apply(&self, spider: &str, mut records: Vec<NewOrganisation>) -> Result<Vec<NewOrganisation>> {
    for plugin in self.for_spider(spider) {
      records = plugin.apply(records)?;
    }
    Ok(records)
  }
}

impl std::fmt::Debug for EnrichmentRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let names: HashMap<&str, Vec<&'static str>> = self
      .by_spider
      .iter()
      .map(|(spider, plugins)| (spider.as_str(), plugins.iter().map(|p| p.name()).collect()))
      .collect();
    f.debug_struct("EnrichmentRegistry").field("by_spider", &names).finish()
  }
}

// ─── Email domain ────────────────────────────────────────────────────────────

/// Mail providers whose domain says nothing about the organisation.
pub const FREE_MAIL_DOMAINS: &[&str] = &[
  "gmail.com",
  "hotmail.com",
  "btinternet.com",
  "hotmail.co.uk",
  "yahoo.co.uk",
  "outlook.com",
  "aol.com",
  "btconnect.com",
  "yahoo.com",
  "googlemail.com",
  "ntlworld.com",
  "talktalk.net",
  "sky.com",
  "live.co.uk",
  "tiscali.co.uk",
  "icloud.com",
  "btopenworld.com",
  "blueyonder.co.uk",
  "virginmedia.com",
  "nhs.net",
  "me.com",
  "msn.com",
  "talk21.com",
  "aol.co.uk",
  "mail.com",
  "live.com",
  "virgin.net",
  "ymail.com",
  "mac.com",
  "waitrose.com",
  "gmail.co.uk",
];

/// Fills `domain` from the email address when it is not already set.
#[derive(Debug, Clone)]
pub struct EmailDomain {
  excluded: HashSet<String>,
}

impl Default for EmailDomain {
  fn default() -> Self {
    Self { excluded: FREE_MAIL_DOMAINS.iter().map(|d| (*d).to_owned()).collect() }
  }
}

impl EmailDomain {
  pub fn domain_of(&self, email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    let domain = domain.split_whitespace().next()?.to_lowercase();
    (!domain.is_empty() && !self.excluded.contains(&domain)).then_some(domain)
  }
}

impl Enrichment for EmailDomain {
  fn name(&self) -> &'static str { "email-domain" }

  fn apply(&self, mut records: Vec<NewOrganisation>) -> Result<Vec<NewOrganisation>> {
    for record in &mut records {
      if record.domain.is_none() {
        record.domain = record.email.as_deref().and_then(|e| self.domain_of(e));
      }
    }
    Ok(records)
  }
}

#[cfg(test)]
mod tests {
  use orgfold_core::Orgid;

  use super::*;

  fn record(email: Option<&str>) -> NewOrganisation {
    let mut rec = NewOrganisation::new(Orgid::parse("GB-CHC-1").unwrap(), "X", "charity");
    rec.email = email.map(str::to_owned);
    rec
  }

  #[test]
  fn email_domain_skips_free_mail() {
    let plugin = EmailDomain::default();
    assert_eq!(plugin.domain_of("info@Example.ORG").as_deref(), Some("example.org"));
    assert_eq!(plugin.domain_of("someone@gmail.com"), None);
    assert_eq!(plugin.domain_of("not an email"), None);
    assert_eq!(plugin.domain_of("trailing@"), None);
  }

  #[test]
  fn email_domain_keeps_existing_domain() {
    let mut with_domain = record(Some("a@example.org"));
    with_domain.domain = Some("kept.org".into());
    let out = EmailDomain::default()
      .apply(vec![with_domain, record(Some("b@charity.org.uk")), record(None)])
      .unwrap();
    assert_eq!(out[0].domain.as_deref(), Some("kept.org"));
    assert_eq!(out[1].domain.as_deref(), Some("charity.org.uk"));
    assert_eq!(out[2].domain, None);
  }

  #[test]
  fn registry_applies_only_to_its_spider() {
    let mut registry = EnrichmentRegistry::default();
    registry.register("ccew", Box::new(EmailDomain::default()));

    let out = registry.apply("ccew", vec![record(Some("a@example.org"))]).unwrap();
    assert_eq!(out[0].domain.as_deref(), Some("example.org"));

    let out = registry.apply("other", vec![record(Some("a@example.org"))]).unwrap();
    assert_eq!(out[0].domain, None);
  }
}
