//! Firmware specific job rewriting.
//!
//! Some firmware builds expect the fields of their built-in templates in a
//! different order, or need placeholders where applications send nothing.
//! A [`JobFilter`] is picked by the firmware version the printer reports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Job;

/// Rewrites jobs for one firmware family.
pub trait JobFilter: Send + Sync {
    fn need_transform(&self, job: &Job) -> bool;
    fn transform(&self, job: &Job) -> Job;
}

const NEVER_EXPIRES: &str = "Ticket Never expires";

/// Replace the "9999 days" validity placeholder with readable text.
pub fn transform_expiry(field: &mut String) {
    let lower = field.to_lowercase();
    if ["9999 days", "9999days", "9999 day", "9999day"].contains(&lower.as_str()) {
        *field = NEVER_EXPIRES.to_string();
    }
}

fn space_if_empty(field: &mut String) {
    if field.is_empty() {
        field.push(' ');
    }
}

/// Builds a reordered job from the input fields.
struct Reorder<'a> {
    input: std::slice::Iter<'a, String>,
    out: Vec<String>,
}

impl<'a> Reorder<'a> {
    fn new(job: &'a Job) -> Self {
        Self {
            input: job.fields.iter(),
            out: Vec::with_capacity(17),
        }
    }

    fn take(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            let field = self.input.next().cloned().unwrap_or_default();
            self.out.push(field);
        }
        self
    }

    fn blank(&mut self) -> &mut Self {
        self.out.push(String::new());
        self
    }

    /// Take one field and apply `f` to it.
    fn map(&mut self, f: impl FnOnce(&mut String)) -> &mut Self {
        let mut field = self.input.next().cloned().unwrap_or_default();
        f(&mut field);
        self.out.push(field);
        self
    }

    fn finish(&mut self, template_id: i16) -> Job {
        Job::new(template_id, std::mem::take(&mut self.out))
    }
}

/// Filter for GUR126003 and the firmware builds sharing its templates.
#[derive(Debug, Default, Copy, Clone)]
pub struct Gur126003;

impl Gur126003 {
    /// Copy the job, blank-protect `space_at` and fix the expiry at `expiry_at`.
    fn patch(job: &Job, count: usize, space_at: usize, expiry_at: usize) -> Job {
        if job.fields.len() != count {
            return job.clone();
        }
        let mut out = job.clone();
        space_if_empty(&mut out.fields[space_at]);
        transform_expiry(&mut out.fields[expiry_at]);
        out
    }

    fn pad(job: &Job) -> Job {
        if job.fields.len() != 3 {
            return job.clone();
        }
        let mut out = job.clone();
        out.fields.resize(7, String::new());
        out
    }

    fn template_1(job: &Job) -> Job {
        if job.fields.len() != 15 {
            return job.clone();
        }
        Reorder::new(job)
            .take(5)
            .blank()
            .take(5)
            .map(space_if_empty)
            .take(1)
            .blank()
            .map(transform_expiry)
            .take(2)
            .finish(job.template_id)
    }

    fn template_3(job: &Job) -> Job {
        if job.fields.len() != 15 {
            return job.clone();
        }
        Reorder::new(job)
            .take(3)
            .blank()
            .take(2)
            .map(space_if_empty)
            .take(6)
            .map(transform_expiry)
            .take(2)
            .finish(job.template_id)
    }

    fn template_7(job: &Job) -> Job {
        if job.fields.len() != 16 {
            return job.clone();
        }
        Reorder::new(job)
            .take(5)
            .blank()
            .take(5)
            .map(space_if_empty)
            .take(2)
            .map(transform_expiry)
            .take(2)
            .finish(job.template_id)
    }

    fn template_9(job: &Job) -> Job {
        if job.fields.len() != 16 {
            return job.clone();
        }
        Reorder::new(job)
            .take(11)
            .map(space_if_empty)
            .take(1)
            .map(|field| {
                transform_expiry(field);
                field.insert_str(0, "Ticket Void After: ");
            })
            .take(2)
            .finish(job.template_id)
    }

    fn template_10(job: &Job) -> Job {
        if job.fields.len() != 16 {
            return job.clone();
        }
        Reorder::new(job)
            .take(7)
            .map(space_if_empty)
            .take(5)
            .map(transform_expiry)
            .take(2)
            .finish(job.template_id)
    }
}

impl JobFilter for Gur126003 {
    fn need_transform(&self, job: &Job) -> bool {
        (0..=11).contains(&job.template_id)
    }

    fn transform(&self, job: &Job) -> Job {
        match job.template_id {
            0 | 2 => Self::patch(job, 17, 11, 14),
            1 => Self::template_1(job),
            3 => Self::template_3(job),
            4 | 5 | 8 => Self::patch(job, 17, 7, 14),
            6 | 11 => Self::pad(job),
            7 => Self::template_7(job),
            9 => Self::template_9(job),
            10 => Self::template_10(job),
            _ => job.clone(),
        }
    }
}

/// Filter for GURNSW200, which adds template `N` on top of GUR126003.
#[derive(Debug, Default, Copy, Clone)]
pub struct GurNsw200 {
    base: Gur126003,
}

const TEMPLATE_N: i16 = b'N' as i16;

impl JobFilter for GurNsw200 {
    fn need_transform(&self, job: &Job) -> bool {
        job.template_id == TEMPLATE_N || self.base.need_transform(job)
    }

    fn transform(&self, job: &Job) -> Job {
        if job.template_id != TEMPLATE_N {
            return self.base.transform(job);
        }
        let mut out = job.clone();
        if out.fields.len() == 21 && out.fields[7].is_empty() {
            // firmware version field
            out.fields[7] = "GURNSW200".to_string();
        }
        out
    }
}

/// Job filters by firmware version.
///
/// Versions without an entry get the fallback filter, GUR126003 by default.
#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn JobFilter>>,
    fallback: Arc<dyn JobFilter>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
            fallback: Arc::new(Gur126003),
        };
        registry.register("GUR126003", Arc::new(Gur126003));
        registry.register("GURNSW200", Arc::new(GurNsw200::default()));
        registry
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut versions: Vec<_> = self.filters.keys().collect();
        versions.sort();
        f.debug_struct("FilterRegistry")
            .field("versions", &versions)
            .finish()
    }
}

impl FilterRegistry {
    pub fn register(&mut self, version: impl Into<String>, filter: Arc<dyn JobFilter>) {
        self.filters.insert(version.into(), filter);
    }

    pub fn lookup(&self, version: &str) -> Arc<dyn JobFilter> {
        self.filters
            .get(version)
            .unwrap_or(&self.fallback)
            .clone()
    }
}

/// Currency printed by a firmware version. Unknown versions use the
/// configured currency if the configured version matches.
pub fn firmware_currency(
    version: &str,
    cfg_version: Option<&str>,
    cfg_currency: Option<&str>,
) -> String {
    let currency = match version {
        "GUR126001" | "GUR126003" | "GURMAC105" | "GURTOR100" | "GURTOR101" => "HKD",
        "GUR109000" | "GURPHI101" => "PHP",
        "GUREUR100" | "GUREUR101" | "GUREUR102" | "GUREUR200" | "GUREURGE2" => "EUR",
        "GURKORGE1" => "KRW",
        "GURLKAGE1" => "LKR",
        "GURMYSGE0" => "MYR",
        "GURSNG103" => "SGD",
        "GURTHAGE0" | "GURTHBGE0" => "THB",
        "GURLTG000" => "TWD",
        "GURUSAG13" | "GURUSDUS1" | "GURUSA001" | "GURUSA003" => "USD",
        "GURSAFGE0" => "ZAR",
        "GURNSW200" => "AUD",
        _ if cfg_version == Some(version) => cfg_currency.unwrap_or_default(),
        _ => "",
    };
    currency.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(template_id: i16, n: usize) -> Job {
        Job::new(template_id, (0..n).map(|i| format!("f{}", i)).collect())
    }

    #[test]
    fn test_expiry() {
        for text in &["9999 days", "9999DAYS", "9999 Day", "9999day"] {
            let mut field = text.to_string();
            transform_expiry(&mut field);
            assert_eq!(field, NEVER_EXPIRES);
        }
        let mut field = "30 days".to_string();
        transform_expiry(&mut field);
        assert_eq!(field, "30 days");
    }

    #[test]
    fn test_template_6_pads() {
        let filter = Gur126003;
        let input = job(6, 3);
        assert!(filter.need_transform(&input));
        let out = filter.transform(&input);
        assert_eq!(out.template_id, 6);
        assert_eq!(out.fields.len(), 7);
        assert_eq!(&out.fields[..3], &input.fields[..]);
        assert!(out.fields[3..].iter().all(String::is_empty));

        // wrong size is left alone
        assert_eq!(filter.transform(&job(11, 4)), job(11, 4));
    }

    #[test]
    fn test_patch_templates() {
        let filter = Gur126003;
        let mut input = job(0, 17);
        input.fields[11].clear();
        input.fields[14] = "9999 days".into();
        let out = filter.transform(&input);
        assert_eq!(out.fields[11], " ");
        assert_eq!(out.fields[14], NEVER_EXPIRES);

        let mut input = job(5, 17);
        input.fields[7].clear();
        let out = filter.transform(&input);
        assert_eq!(out.fields[7], " ");
        assert_eq!(out.fields.len(), 17);
    }

    #[test]
    fn test_template_1_reorder() {
        let mut input = job(1, 15);
        input.fields[10].clear();
        input.fields[12] = "9999day".into();
        let out = Gur126003.transform(&input);
        let expected = [
            "f0", "f1", "f2", "f3", "f4", "", "f5", "f6", "f7", "f8", "f9", " ", "f11", "",
            NEVER_EXPIRES, "f13", "f14",
        ];
        assert_eq!(out.fields, expected);
        assert_eq!(out.template_id, 1);
    }

    #[test]
    fn test_template_3_reorder() {
        let out = Gur126003.transform(&job(3, 15));
        let expected = [
            "f0", "f1", "f2", "", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12",
            "f13", "f14",
        ];
        assert_eq!(out.fields, expected);
    }

    #[test]
    fn test_template_7_reorder() {
        let out = Gur126003.transform(&job(7, 16));
        assert_eq!(out.fields.len(), 17);
        assert_eq!(out.fields[5], "");
        assert_eq!(out.fields[6], "f5");
        assert_eq!(out.fields[16], "f15");
    }

    #[test]
    fn test_template_9_void_after() {
        let mut input = job(9, 16);
        input.fields[13] = "9999 days".into();
        let out = Gur126003.transform(&input);
        assert_eq!(out.fields.len(), 16);
        assert_eq!(out.fields[13], "Ticket Void After: Ticket Never expires");
        assert_eq!(out.fields[15], "f15");
    }

    #[test]
    fn test_template_10() {
        let mut input = job(10, 16);
        input.fields[7].clear();
        let out = Gur126003.transform(&input);
        assert_eq!(out.fields[7], " ");
        assert_eq!(out.fields.len(), 16);
    }

    #[test]
    fn test_nsw200() {
        let filter = GurNsw200::default();
        let mut input = job(TEMPLATE_N, 21);
        input.fields[7].clear();
        assert!(filter.need_transform(&input));
        assert_eq!(filter.transform(&input).fields[7], "GURNSW200");
        assert_eq!(filter.transform(&job(TEMPLATE_N, 20)), job(TEMPLATE_N, 20));
        // falls through to GUR126003
        assert_eq!(filter.transform(&job(6, 3)).fields.len(), 7);
        assert!(!filter.need_transform(&job(12, 3)));
    }

    #[test]
    fn test_registry_fallback() {
        let registry = FilterRegistry::default();
        let mut input = job(TEMPLATE_N, 21);
        input.fields[7].clear();

        let nsw = registry.lookup("GURNSW200");
        assert_eq!(nsw.transform(&input).fields[7], "GURNSW200");

        for version in &["GUR126003", "GUREUR100", ""] {
            let filter = registry.lookup(version);
            assert!(!filter.need_transform(&input));
            assert_eq!(filter.transform(&job(6, 3)).fields.len(), 7);
        }
    }

    #[test]
    fn test_currency() {
        assert_eq!(firmware_currency("GUR126003", None, None), "HKD");
        assert_eq!(firmware_currency("GURNSW200", None, None), "AUD");
        assert_eq!(firmware_currency("GURUSA003", Some("GURUSA003"), Some("XXX")), "USD");
        assert_eq!(firmware_currency("GURNZL001", Some("GURNZL001"), Some("NZD")), "NZD");
        assert_eq!(firmware_currency("GURNZL001", Some("GURNZL002"), Some("NZD")), "");
        assert_eq!(firmware_currency("GURNZL001", Some("GURNZL001"), None), "");
    }
}
