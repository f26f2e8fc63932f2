use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, HistoryFilter, Table};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn health(base: &str) -> String {
    base_join(base, "/healthz")
}

pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_V1_PREFIX))
}

pub fn collection(base: &str, table: Table) -> String {
    base_join(base, &format!("{}/{}", API_V1_PREFIX, table.as_str()))
}

pub fn filtered_collection(base: &str, table: Table, filter: &HistoryFilter) -> String {
    let mut url = collection(base, table);
    let pairs = [
        ("punishment_id", &filter.punishment_id),
        ("task_id", &filter.task_id),
        ("rule_id", &filter.rule_id),
    ];
    let mut sep = '?';
    for (name, value) in pairs {
        if let Some(v) = value {
            url.push(sep);
            url.push_str(name);
            url.push('=');
            url.push_str(&enc(v));
            sep = '&';
        }
    }
    url
}

pub fn item(base: &str, table: Table, id: &str) -> String {
    base_join(
        base,
        &format!("{}/{}/{}", API_V1_PREFIX, table.as_str(), enc(id)),
    )
}

fn action(base: &str, table: Table, id: &str, verb: &str) -> String {
    base_join(
        base,
        &format!("{}/{}/{}/{}", API_V1_PREFIX, table.as_str(), enc(id), verb),
    )
}

pub fn task_complete(base: &str, task_id: &str) -> String {
    action(base, Table::Tasks, task_id, "complete")
}

pub fn rule_violate(base: &str, rule_id: &str) -> String {
    action(base, Table::Rules, rule_id, "violate")
}

pub fn reward_buy(base: &str, reward_id: &str) -> String {
    action(base, Table::Rewards, reward_id, "buy")
}

pub fn punishment_apply(base: &str, punishment_id: &str) -> String {
    action(base, Table::Punishments, punishment_id, "apply")
}

pub fn profile_points(base: &str, profile_id: &str) -> String {
    action(base, Table::Profiles, profile_id, "points")
}
