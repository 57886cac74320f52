// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

pub mod deduplication;
pub mod normal_form;

pub use deduplication::{DedupPolicy, ReportDeduplicator};
pub use normal_form::{
    alternative_with_ip_address, domain_normal_form, normal_form, url_normal_form, NormalForm,
    NormalFormRules,
};
