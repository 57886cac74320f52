// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::normal_form::{alternative_with_ip_address, NormalForm, NormalFormRules};
use crate::config::ReportingConfig;
use crate::types::{Finding, Severity};

/// How long after sending a finding its duplicates stay suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    pub grace_days_low: i64,
    pub grace_days_medium: i64,
    pub grace_days_high: i64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::from_config(&ReportingConfig::default())
    }
}

impl DedupPolicy {
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self {
            grace_days_low: config.grace_days_low,
            grace_days_medium: config.grace_days_medium,
            grace_days_high: config.grace_days_high,
        }
    }

    /// `None` when the configured day count does not fit a `Duration`
    pub fn grace_period(&self, severity: Severity) -> Option<Duration> {
        let days = match severity {
            Severity::Low => self.grace_days_low,
            Severity::Medium => self.grace_days_medium,
            Severity::High => self.grace_days_high,
        };
        Duration::try_days(days)
    }

    /// Sent within its grace period; findings without a timestamp never are.
    ///
    /// A grace period reaching past the representable time range covers everything.
    fn is_recent(&self, finding: &Finding, now: DateTime<Utc>) -> bool {
        let Some(ts) = finding.timestamp else {
            return false;
        };

        match self
            .grace_period(finding.severity)
            .and_then(|grace| now.checked_sub_signed(grace))
        {
            Some(cutoff) => ts >= cutoff,
            None => true,
        }
    }

    fn all_old<'a>(&self, findings: impl IntoIterator<Item = &'a Finding>, now: DateTime<Utc>) -> bool {
        findings.into_iter().all(|f| !self.is_recent(f, now))
    }
}

fn build_subsequent_reminder(finding: &Finding) -> Finding {
    let mut reminder = finding.clone();
    reminder.is_subsequent_reminder = true;
    reminder
}

/// Findings grouped by normal form and by the normal form of their IP alternative
struct FindingsByNormalForms<'a> {
    by_normal_forms: HashMap<NormalForm, Vec<&'a Finding>>,
    by_alternative_ip_normal_forms: HashMap<NormalForm, Vec<Finding>>,
}

impl<'a> FindingsByNormalForms<'a> {
    fn from_findings(findings: &'a [Finding], rules: &NormalFormRules) -> Self {
        let mut by_normal_forms: HashMap<NormalForm, Vec<&Finding>> = HashMap::new();
        let mut by_alternative_ip_normal_forms: HashMap<NormalForm, Vec<Finding>> = HashMap::new();

        for finding in findings {
            by_normal_forms
                .entry(rules.normal_form(finding))
                .or_default()
                .push(finding);

            if let Some(alternative) = alternative_with_ip_address(finding) {
                by_alternative_ip_normal_forms
                    .entry(rules.normal_form(&alternative))
                    .or_default()
                    .push(alternative);
            }
        }

        Self {
            by_normal_forms,
            by_alternative_ip_normal_forms,
        }
    }
}

/// Decides which findings are worth (re)sending given what was already sent.
///
/// Every operation is a pure function of its inputs and `now`.
#[derive(Debug, Clone, Default)]
pub struct ReportDeduplicator {
    rules: NormalFormRules,
    policy: DedupPolicy,
}

impl ReportDeduplicator {
    pub fn new(rules: NormalFormRules, policy: DedupPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn from_config(config: &ReportingConfig) -> Self {
        Self::new(NormalFormRules::from_config(config), DedupPolicy::from_config(config))
    }

    pub fn rules(&self) -> &NormalFormRules {
        &self.rules
    }

    /// Suppress or remind findings already sent; collapse duplicates within the batch.
    ///
    /// Output keeps the order in which normal forms first appear among
    /// `candidates`. Among new findings sharing a normal form the highest
    /// score wins and ties keep the first seen.
    pub fn deduplicate_reports(
        &self,
        previous: &[Finding],
        candidates: &[Finding],
        now: DateTime<Utc>,
    ) -> Vec<Finding> {
        let mut previous_by_normal_forms: HashMap<NormalForm, Vec<&Finding>> = HashMap::new();
        for finding in previous {
            previous_by_normal_forms
                .entry(self.rules.normal_form(finding))
                .or_default()
                .push(finding);
        }

        let mut selected: Vec<Finding> = Vec::new();
        let mut slot_of: HashMap<NormalForm, usize> = HashMap::new();
        let mut suppressed = 0usize;

        for candidate in candidates {
            let normal_form = self.rules.normal_form(candidate);

            if let Some(sent) = previous_by_normal_forms.get(&normal_form) {
                if self.policy.all_old(sent.iter().copied(), now) {
                    let reminder = build_subsequent_reminder(candidate);
                    match slot_of.get(&normal_form) {
                        Some(&slot) => selected[slot] = reminder,
                        None => {
                            slot_of.insert(normal_form, selected.len());
                            selected.push(reminder);
                        }
                    }
                } else {
                    suppressed += 1;
                }
                continue;
            }

            match slot_of.get(&normal_form) {
                Some(&slot) => {
                    if self.rules.score(&selected[slot]) < self.rules.score(candidate) {
                        selected[slot] = candidate.clone();
                    }
                }
                None => {
                    slot_of.insert(normal_form, selected.len());
                    selected.push(candidate.clone());
                }
            }
        }

        debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            suppressed = suppressed,
            "Deduplicated findings"
        );

        selected
    }

    /// Merge IP-hosted and domain-hosted versions of one finding.
    ///
    /// Drops a finding when:
    /// - it is on an IP and the same finding on a domain resolving to that IP was sent,
    /// - it is on an IP and the domain version is in this batch,
    /// - it is on a domain and the version on its IP was sent.
    ///
    /// Sent counterparts that are all past their grace period turn the
    /// finding into a reminder instead.
    pub fn deduplicate_ip_vs_domain_versions(
        &self,
        previous: &[Finding],
        candidates: &[Finding],
        now: DateTime<Utc>,
    ) -> Vec<Finding> {
        let previous_normalized = FindingsByNormalForms::from_findings(previous, &self.rules);
        let candidates_normalized = FindingsByNormalForms::from_findings(candidates, &self.rules);
        let mut filtered = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.target_is_ip_address() {
                let normal_form = self.rules.normal_form(candidate);

                if let Some(sent) = previous_normalized
                    .by_alternative_ip_normal_forms
                    .get(&normal_form)
                {
                    if self.policy.all_old(sent, now) {
                        filtered.push(build_subsequent_reminder(candidate));
                    }
                    continue;
                }

                if candidates_normalized
                    .by_alternative_ip_normal_forms
                    .contains_key(&normal_form)
                {
                    debug!(target = %candidate.target, "Domain version of IP finding present, dropping");
                    continue;
                }

                filtered.push(candidate.clone());
            } else {
                let sent = alternative_with_ip_address(candidate).and_then(|alternative| {
                    previous_normalized
                        .by_normal_forms
                        .get(&self.rules.normal_form(&alternative))
                });

                match sent {
                    Some(sent) => {
                        if self.policy.all_old(sent.iter().copied(), now) {
                            filtered.push(build_subsequent_reminder(candidate));
                        }
                    }
                    None => filtered.push(candidate.clone()),
                }
            }
        }

        filtered
    }

    /// Both passes: normal-form deduplication, then IP/domain merging
    pub fn deduplicate(
        &self,
        previous: &[Finding],
        candidates: &[Finding],
        now: DateTime<Utc>,
    ) -> Vec<Finding> {
        let deduplicated = self.deduplicate_reports(previous, candidates, now);
        self.deduplicate_ip_vs_domain_versions(previous, &deduplicated, now)
    }
}
