// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `queryMessages`/`getMessageByRef` filter, sort, and pagination shapes
//! (§4.7). Kept separate from [`crate::store`] since the matching logic has
//! no business touching the message list's storage.

use crate::constants::{Kind, Level, LifecycleState};
use crate::message::{Audience, Message};

/// `getMessageByRef`'s `filter` parameter.
#[derive(Debug, Clone, Default)]
pub enum StateFilter {
    #[default]
    All,
    QuasiOpen,
    QuasiDeleted,
    States(Vec<LifecycleState>),
}

impl StateFilter {
    pub fn matches(&self, state: LifecycleState) -> bool {
        match self {
            Self::All => true,
            Self::QuasiOpen => state.is_quasi_open(),
            Self::QuasiDeleted => state.is_quasi_deleted(),
            Self::States(list) => list.contains(&state),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TimingField {
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
    NotifyAt,
    DueAt,
    StartAt,
    EndAt,
}

impl TimingField {
    fn value(self, msg: &Message) -> Option<i64> {
        let t = &msg.timing;
        match self {
            Self::CreatedAt => Some(t.created_at),
            Self::UpdatedAt => Some(t.updated_at),
            Self::ExpiresAt => t.expires_at,
            Self::NotifyAt => t.notify_at,
            Self::DueAt => t.due_at,
            Self::StartAt => t.start_at,
            Self::EndAt => t.end_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimingRangeFilter {
    pub field: TimingField,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Whether a message with this field absent (e.g. `notifyAt == None`)
    /// still passes the filter.
    pub or_missing: bool,
}

impl TimingRangeFilter {
    fn matches(&self, msg: &Message) -> bool {
        match self.field.value(msg) {
            None => self.or_missing,
            Some(v) => self.min.is_none_or(|min| v >= min) && self.max.is_none_or(|max| v <= max),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ListMatchMode {
    Any,
    All,
}

#[derive(Debug, Clone, Copy)]
pub enum StringListField {
    Dependencies,
    AudienceTags,
}

impl StringListField {
    fn values(self, msg: &Message) -> Option<&[String]> {
        match self {
            Self::Dependencies => Some(msg.dependencies.as_slice()),
            Self::AudienceTags => msg.audience.as_ref().and_then(|a: &Audience| a.tags.as_deref()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StringListFilter {
    pub field: StringListField,
    pub mode: ListMatchMode,
    pub values: Vec<String>,
    pub or_missing: bool,
}

impl StringListFilter {
    fn matches(&self, msg: &Message) -> bool {
        match self.field.values(msg) {
            None => self.or_missing,
            Some(present) => match self.mode {
                ListMatchMode::Any => self.values.iter().any(|v| present.contains(v)),
                ListMatchMode::All => self.values.iter().all(|v| present.contains(v)),
            },
        }
    }
}

/// Audience-channels "routeTo" predicate (§4.7): `exclude` wins over
/// `include`; absence of scope on the message accepts all routes;
/// `"*"`/`"all"` accepts any route.
pub fn route_to_matches(audience: Option<&Audience>, channel: &str) -> bool {
    let Some(channels) = audience.map(|a| &a.channels) else {
        return true;
    };
    if let Some(exclude) = &channels.exclude {
        if exclude.iter().any(|c| c == "*" || c == "all" || c == channel) {
            return false;
        }
    }
    match &channels.include {
        None => true,
        Some(include) => include.iter().any(|c| c == "*" || c == "all" || c == channel),
    }
}

#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    pub level_include: Option<Vec<Level>>,
    pub level_exclude: Option<Vec<Level>>,
    pub kind_include: Option<Vec<Kind>>,
    pub kind_exclude: Option<Vec<Kind>>,
    pub timing_ranges: Vec<TimingRangeFilter>,
    pub string_list_filters: Vec<StringListFilter>,
    pub route_to: Option<String>,
    /// Escape hatch for the default-hidden lifecycle states (§4.7,§8): a
    /// message whose state is listed here is kept even if it's
    /// deleted/expired. `None` (the default) keeps the usual hide-by-default
    /// behavior.
    pub include_lifecycle_states: Option<Vec<LifecycleState>>,
}

impl WhereClause {
    fn matches(&self, msg: &Message) -> bool {
        if let Some(include) = &self.level_include {
            if !include.contains(&msg.level) {
                return false;
            }
        }
        if let Some(exclude) = &self.level_exclude {
            if exclude.contains(&msg.level) {
                return false;
            }
        }
        if let Some(include) = &self.kind_include {
            if !include.contains(&msg.kind) {
                return false;
            }
        }
        if let Some(exclude) = &self.kind_exclude {
            if exclude.contains(&msg.kind) {
                return false;
            }
        }
        if !self.timing_ranges.iter().all(|f| f.matches(msg)) {
            return false;
        }
        if !self.string_list_filters.iter().all(|f| f.matches(msg)) {
            return false;
        }
        if let Some(channel) = &self.route_to {
            if !route_to_matches(msg.audience.as_ref(), channel) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    DueAt,
    NotifyAt,
    Level,
    Title,
}

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub field: SortField,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PageSpec {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub where_: Option<WhereClause>,
    pub sort: Option<SortSpec>,
    pub page: Option<PageSpec>,
}

pub struct QueryResult<'a> {
    pub total: usize,
    pub pages: usize,
    pub items: Vec<&'a Message>,
}

/// Runs `query` against `list`. Deleted/expired entries are hidden by
/// default; a caller that actually wants them back sets
/// `where_.include_lifecycle_states` to the states it wants visible — the
/// default visibility rule lives here, at the query boundary, not in the
/// Store.
pub fn run<'a>(list: &'a [Message], query: &Query) -> QueryResult<'a> {
    let explicit_states = query.where_.as_ref().and_then(|w| w.include_lifecycle_states.as_ref());
    let mut matched: Vec<&Message> = list
        .iter()
        .filter(|m| !m.is_expired_or_deleted() || explicit_states.is_some_and(|states| states.contains(&m.lifecycle.state)))
        .filter(|m| query.where_.as_ref().is_none_or(|w| w.matches(m)))
        .collect();

    if let Some(sort) = query.sort {
        matched.sort_by(|a, b| {
            let ord = compare_by(sort.field, a, b);
            let ord = if sort.descending { ord.reverse() } else { ord };
            ord.then_with(|| a.ref_.cmp(&b.ref_))
        });
    } else {
        matched.sort_by(|a, b| a.ref_.cmp(&b.ref_));
    }

    let total = matched.len();
    let page_size = query.page.map(|p| p.page_size).unwrap_or(total.max(1));
    let pages = if page_size == 0 { 0 } else { total.div_ceil(page_size) };

    let items = match query.page {
        None => matched,
        Some(p) => {
            let start = p.page.saturating_sub(1) * p.page_size;
            matched.into_iter().skip(start).take(p.page_size).collect()
        }
    };

    QueryResult { total, pages, items }
}

fn compare_by(field: SortField, a: &Message, b: &Message) -> std::cmp::Ordering {
    match field {
        SortField::CreatedAt => a.timing.created_at.cmp(&b.timing.created_at),
        SortField::UpdatedAt => a.timing.updated_at.cmp(&b.timing.updated_at),
        SortField::DueAt => a.timing.due_at.cmp(&b.timing.due_at),
        SortField::NotifyAt => a.timing.notify_at.cmp(&b.timing.notify_at),
        SortField::Level => a.level.cmp(&b.level),
        SortField::Title => a.title.cmp(&b.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OriginType;
    use crate::message::{Lifecycle, Origin, Timing};

    fn msg(ref_: &str, level: Level, due_at: Option<i64>) -> Message {
        Message {
            ref_: ref_.to_string(),
            title: ref_.to_string(),
            text: "t".into(),
            icon: None,
            level,
            kind: Kind::Task,
            origin: Origin { origin_type: OriginType::Manual, system: None, id: None },
            lifecycle: Lifecycle::default(),
            timing: Timing { created_at: 0, updated_at: 0, due_at, ..Default::default() },
            details: None,
            metrics: Default::default(),
            attachments: Vec::new(),
            list_items: Default::default(),
            actions: Default::default(),
            progress: None,
            audience: None,
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn deleted_and_expired_are_hidden_by_default() {
        let mut deleted = msg("r1", Level::Notice, None);
        deleted.lifecycle.state = LifecycleState::Deleted;
        let open = msg("r2", Level::Notice, None);
        let list = vec![deleted, open];
        let result = run(&list, &Query::default());
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].ref_, "r2");
    }

    #[test]
    fn deleted_is_visible_when_explicitly_requested() {
        let mut deleted = msg("r1", Level::Notice, None);
        deleted.lifecycle.state = LifecycleState::Deleted;
        let open = msg("r2", Level::Notice, None);
        let list = vec![deleted, open];
        let query = Query {
            where_: Some(WhereClause { include_lifecycle_states: Some(vec![LifecycleState::Deleted]), ..Default::default() }),
            ..Default::default()
        };
        let result = run(&list, &query);
        assert_eq!(result.total, 2);
    }

    #[test]
    fn sort_by_due_at_with_ref_tiebreak() {
        let list = vec![msg("b", Level::Notice, Some(5)), msg("a", Level::Notice, Some(5))];
        let query = Query { sort: Some(SortSpec { field: SortField::DueAt, descending: false }), ..Default::default() };
        let result = run(&list, &query);
        assert_eq!(result.items[0].ref_, "a");
        assert_eq!(result.items[1].ref_, "b");
    }

    #[test]
    fn pagination_is_one_based() {
        let list = vec![msg("a", Level::Notice, None), msg("b", Level::Notice, None), msg("c", Level::Notice, None)];
        let query = Query { page: Some(PageSpec { page: 2, page_size: 2 }), ..Default::default() };
        let result = run(&list, &query);
        assert_eq!(result.total, 3);
        assert_eq!(result.pages, 2);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].ref_, "c");
    }

    #[test]
    fn route_to_exclude_wins_over_include() {
        let mut m = msg("a", Level::Notice, None);
        m.audience = Some(Audience {
            tags: None,
            channels: crate::message::AudienceChannels {
                include: Some(vec!["kitchen".into()]),
                exclude: Some(vec!["kitchen".into()]),
            },
        });
        assert!(!route_to_matches(m.audience.as_ref(), "kitchen"));
    }

    #[test]
    fn route_to_no_scope_accepts_all() {
        assert!(route_to_matches(None, "anything"));
    }
}
