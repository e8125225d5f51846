//! Hook manager — filters and actions grouped by tag, then by priority.
//!
//! Within a tag, callbacks run in ascending priority; callbacks sharing a
//! priority run in registration order. Every entry records the plugin that
//! registered it so a plugin's hooks can be torn down without inspecting
//! the callbacks themselves.

use std::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use trees_core::error::AppError;
use trees_core::result::AppResult;

use super::definitions::{ActionCallback, FilterCallback, FilterValue, HookInfo, HookKind};

/// Entry in a priority bucket.
struct HookEntry<C> {
    /// The callback.
    callback: C,
    /// Plugin that registered this callback.
    owner: Option<String>,
}

/// Tag → priority → entries in registration order.
type HookTable<C> = HashMap<String, BTreeMap<i32, Vec<HookEntry<C>>>>;

/// Priority-ordered filter/action bus.
#[derive(Default)]
pub struct HookManager {
    /// Filter chains.
    filters: RwLock<HookTable<FilterCallback>>,
    /// Action lists.
    actions: RwLock<HookTable<ActionCallback>>,
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("filters", &read(&self.filters).len())
            .field("actions", &read(&self.actions).len())
            .finish()
    }
}

impl HookManager {
    /// Creates an empty hook manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter for values of type `T` under `tag`.
    ///
    /// Identical callbacks registered twice become two independent entries.
    pub fn add_filter<T, F>(&self, tag: &str, callback: F, priority: i32, owner: Option<&str>)
    where
        T: Any + Send,
        F: Fn(T, &[Value]) -> AppResult<T> + Send + Sync + 'static,
    {
        let filter_tag = tag.to_string();
        let erased: FilterCallback = Arc::new(move |value: FilterValue, args: &[Value]| {
            let value = value.downcast::<T>().map_err(|_| {
                AppError::hook_callback(format!(
                    "Filter on '{}' expects a {} value",
                    filter_tag,
                    type_name::<T>()
                ))
            })?;
            Ok(Box::new(callback(*value, args)?) as FilterValue)
        });

        insert(&self.filters, tag, erased, priority, owner);

        debug!(
            tag = %tag,
            kind = %HookKind::Filter,
            priority,
            owner = ?owner,
            "Hook registered"
        );
    }

    /// Folds `value` through every filter registered under `tag`.
    ///
    /// With no filters the value is returned unchanged. The first failing
    /// callback aborts the chain and its error is returned.
    pub fn apply_filters<T>(&self, tag: &str, value: T, args: &[Value]) -> AppResult<T>
    where
        T: Any + Send,
    {
        let chain = snapshot(&self.filters, tag);
        if chain.is_empty() {
            return Ok(value);
        }

        debug!(tag = %tag, callbacks = chain.len(), "Applying filters");

        let mut current: FilterValue = Box::new(value);
        for callback in &chain {
            current = callback(current, args)?;
        }

        current.downcast::<T>().map(|value| *value).map_err(|_| {
            AppError::hook_callback(format!(
                "Filter chain on '{}' did not produce a {}",
                tag,
                type_name::<T>()
            ))
        })
    }

    /// Registers an action under `tag`.
    pub fn add_action<F>(&self, tag: &str, callback: F, priority: i32, owner: Option<&str>)
    where
        F: Fn(&[Value]) -> AppResult<()> + Send + Sync + 'static,
    {
        insert(
            &self.actions,
            tag,
            Arc::new(callback) as ActionCallback,
            priority,
            owner,
        );

        debug!(
            tag = %tag,
            kind = %HookKind::Action,
            priority,
            owner = ?owner,
            "Hook registered"
        );
    }

    /// Runs every action registered under `tag`.
    ///
    /// A failing action aborts the remaining actions and its error is returned.
    pub fn do_action(&self, tag: &str, args: &[Value]) -> AppResult<()> {
        let callbacks = snapshot(&self.actions, tag);
        if callbacks.is_empty() {
            return Ok(());
        }

        debug!(tag = %tag, callbacks = callbacks.len(), "Running actions");

        for callback in &callbacks {
            callback(args)?;
        }
        Ok(())
    }

    /// Removes every filter and action owned by `owner` across all tags,
    /// pruning empty buckets and tags. Returns the number of entries removed.
    pub fn remove_plugin_hooks(&self, owner: &str) -> usize {
        let removed = prune(&self.filters, owner) + prune(&self.actions, owner);

        if removed > 0 {
            info!(plugin_id = %owner, removed, "Plugin hooks removed");
        }

        removed
    }

    /// Returns whether any filter is registered under `tag`.
    pub fn has_filter(&self, tag: &str) -> bool {
        read(&self.filters).contains_key(tag)
    }

    /// Returns whether any action is registered under `tag`.
    pub fn has_action(&self, tag: &str) -> bool {
        read(&self.actions).contains_key(tag)
    }

    /// Number of filters under `tag`.
    pub fn filter_count(&self, tag: &str) -> usize {
        count(&read(&self.filters), tag)
    }

    /// Number of actions under `tag`.
    pub fn action_count(&self, tag: &str) -> usize {
        count(&read(&self.actions), tag)
    }

    /// Number of filters and actions owned by `owner`.
    pub fn count_owned_by(&self, owner: &str) -> usize {
        self.hooks()
            .iter()
            .filter(|hook| hook.owner.as_deref() == Some(owner))
            .count()
    }

    /// Snapshot of every registered hook, sorted by tag then dispatch order.
    pub fn hooks(&self) -> Vec<HookInfo> {
        let mut hooks = describe(&read(&self.filters), HookKind::Filter);
        hooks.extend(describe(&read(&self.actions), HookKind::Action));
        // Stable sort keeps dispatch order within a tag.
        hooks.sort_by(|a, b| a.tag.cmp(&b.tag).then(a.priority.cmp(&b.priority)));
        hooks
    }
}

fn read<C>(table: &RwLock<HookTable<C>>) -> std::sync::RwLockReadGuard<'_, HookTable<C>> {
    table.read().unwrap_or_else(PoisonError::into_inner)
}

fn insert<C>(
    table: &RwLock<HookTable<C>>,
    tag: &str,
    callback: C,
    priority: i32,
    owner: Option<&str>,
) {
    table
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(tag.to_string())
        .or_default()
        .entry(priority)
        .or_default()
        .push(HookEntry {
            callback,
            owner: owner.map(str::to_string),
        });
}

/// Clones the callbacks for `tag` in dispatch order so no lock is held while
/// they run; callbacks may register further hooks.
fn snapshot<C: Clone>(table: &RwLock<HookTable<C>>, tag: &str) -> Vec<C> {
    read(table)
        .get(tag)
        .map(|buckets| {
            buckets
                .values()
                .flatten()
                .map(|entry| entry.callback.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn prune<C>(table: &RwLock<HookTable<C>>, owner: &str) -> usize {
    let mut table = table.write().unwrap_or_else(PoisonError::into_inner);
    let mut removed = 0;

    for buckets in table.values_mut() {
        for entries in buckets.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.owner.as_deref() != Some(owner));
            removed += before - entries.len();
        }
        buckets.retain(|_, entries| !entries.is_empty());
    }
    table.retain(|_, buckets| !buckets.is_empty());

    removed
}

fn count<C>(table: &HookTable<C>, tag: &str) -> usize {
    table
        .get(tag)
        .map(|buckets| buckets.values().map(Vec::len).sum())
        .unwrap_or(0)
}

fn describe<C>(table: &HookTable<C>, kind: HookKind) -> Vec<HookInfo> {
    table
        .iter()
        .flat_map(|(tag, buckets)| {
            buckets.iter().flat_map(move |(priority, entries)| {
                entries.iter().map(move |entry| HookInfo {
                    tag: tag.clone(),
                    kind,
                    priority: *priority,
                    owner: entry.owner.clone(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::hooks::definitions::DEFAULT_PRIORITY;

    fn push(label: &'static str) -> impl Fn(Vec<String>, &[Value]) -> AppResult<Vec<String>> {
        move |mut items: Vec<String>, _| {
            items.push(label.to_string());
            Ok(items)
        }
    }

    #[test]
    fn test_unknown_tag_is_identity() {
        let hooks = HookManager::new();
        assert_eq!(hooks.apply_filters("nothing", 7_i32, &[]).unwrap(), 7);
        assert!(hooks.do_action("nothing", &[]).is_ok());
    }

    #[test]
    fn test_lower_priority_runs_first() {
        let hooks = HookManager::new();
        hooks.add_filter("list", push("A"), 10, None);
        hooks.add_filter("list", push("B"), 5, None);

        let result: Vec<String> = hooks.apply_filters("list", Vec::new(), &[]).unwrap();
        assert_eq!(result, vec!["B", "A"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let hooks = HookManager::new();
        hooks.add_filter("list", push("first"), DEFAULT_PRIORITY, None);
        hooks.add_filter("list", push("second"), DEFAULT_PRIORITY, None);
        hooks.add_filter("list", push("early"), -1, None);

        let result: Vec<String> = hooks.apply_filters("list", Vec::new(), &[]).unwrap();
        assert_eq!(result, vec!["early", "first", "second"]);
    }

    #[test]
    fn test_extra_args_are_passed_through() {
        let hooks = HookManager::new();
        hooks.add_filter(
            "title",
            |title: String, args: &[Value]| {
                let suffix = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(format!("{title}{suffix}"))
            },
            DEFAULT_PRIORITY,
            None,
        );

        let title = hooks
            .apply_filters("title", "Home".to_string(), &[json!(" | Trees")])
            .unwrap();
        assert_eq!(title, "Home | Trees");
    }

    #[test]
    fn test_failing_filter_aborts_chain() {
        let hooks = HookManager::new();
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();

        hooks.add_filter(
            "n",
            |_: i32, _: &[Value]| Err(AppError::hook_callback("boom")),
            1,
            None,
        );
        hooks.add_filter(
            "n",
            move |n: i32, _: &[Value]| {
                *flag.lock().unwrap() = true;
                Ok(n)
            },
            2,
            None,
        );

        let err = hooks.apply_filters("n", 1_i32, &[]).unwrap_err();
        assert_eq!(err.message, "boom");
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let hooks = HookManager::new();
        hooks.add_filter("n", |n: i32, _: &[Value]| Ok(n + 1), DEFAULT_PRIORITY, None);
        let err = hooks.apply_filters("n", "text".to_string(), &[]).unwrap_err();
        assert!(err.is(trees_core::ErrorKind::HookCallback));
    }

    #[test]
    fn test_actions_run_in_order_and_abort_on_error() {
        let hooks = HookManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (label, priority) in [("late", 20), ("early", 1)] {
            let log = log.clone();
            hooks.add_action(
                "init",
                move |_: &[Value]| {
                    log.lock().unwrap().push(label);
                    Ok(())
                },
                priority,
                None,
            );
        }
        hooks.do_action("init", &[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);

        hooks.add_action("init", |_: &[Value]| Err(AppError::hook_callback("stop")), 5, None);
        log.lock().unwrap().clear();
        assert!(hooks.do_action("init", &[]).is_err());
        assert_eq!(*log.lock().unwrap(), vec!["early"]);
    }

    #[test]
    fn test_remove_plugin_hooks_only_touches_owner() {
        let hooks = HookManager::new();
        hooks.add_filter("list", push("p1"), 5, Some("p1"));
        hooks.add_filter("list", push("p2"), 5, Some("p2"));
        hooks.add_filter("list", push("core"), 10, None);
        hooks.add_action("init", |_: &[Value]| Ok(()), DEFAULT_PRIORITY, Some("p1"));

        assert_eq!(hooks.remove_plugin_hooks("p1"), 2);
        assert!(!hooks.has_action("init"));

        let result: Vec<String> = hooks.apply_filters("list", Vec::new(), &[]).unwrap();
        assert_eq!(result, vec!["p2", "core"]);

        assert_eq!(hooks.remove_plugin_hooks("p1"), 0);
        assert_eq!(hooks.filter_count("list"), 2);
    }

    #[test]
    fn test_remove_prunes_empty_tags() {
        let hooks = HookManager::new();
        hooks.add_filter("only", push("x"), 1, Some("p1"));
        hooks.remove_plugin_hooks("p1");
        assert!(!hooks.has_filter("only"));
        assert!(hooks.hooks().is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_not_deduplicated() {
        let hooks = HookManager::new();
        hooks.add_filter("n", |n: i32, _: &[Value]| Ok(n * 2), DEFAULT_PRIORITY, None);
        hooks.add_filter("n", |n: i32, _: &[Value]| Ok(n * 2), DEFAULT_PRIORITY, None);
        assert_eq!(hooks.apply_filters("n", 3_i32, &[]).unwrap(), 12);
    }

    #[test]
    fn test_callback_may_register_hooks() {
        let hooks = Arc::new(HookManager::new());
        let inner = hooks.clone();
        hooks.add_action(
            "init",
            move |_: &[Value]| {
                inner.add_action("later", |_: &[Value]| Ok(()), DEFAULT_PRIORITY, None);
                Ok(())
            },
            DEFAULT_PRIORITY,
            None,
        );

        hooks.do_action("init", &[]).unwrap();
        assert!(hooks.has_action("later"));
    }

    #[test]
    fn test_hooks_listing_and_owner_counts() {
        let hooks = HookManager::new();
        hooks.add_filter("b", push("x"), 10, Some("p1"));
        hooks.add_action("a", |_: &[Value]| Ok(()), 3, None);
        hooks.add_filter("b", push("y"), 1, Some("p1"));

        let listed = hooks.hooks();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].tag, "a");
        assert_eq!(listed[1].priority, 1);
        assert_eq!(hooks.count_owned_by("p1"), 2);
    }
}
