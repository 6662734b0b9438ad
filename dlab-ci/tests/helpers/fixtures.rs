//! 5e-tools style source records

use serde_json::{json, Value};

pub fn background(name: &str, source: &str) -> Value {
    json!({
        "name": name,
        "source": source,
        "page": 178,
        "skillProficiencies": [{"insight": true, "religion": true}],
        "entries": [format!("{} background description.", name)]
    })
}

/// Missing its required `name`
pub fn malformed_background() -> Value {
    json!({
        "source": "XPHB",
        "entries": ["No name here."]
    })
}

pub fn class(name: &str) -> Value {
    json!({
        "name": name,
        "source": "XPHB",
        "hd": {"number": 1, "faces": 6},
        "primaryAbility": [{"int": true}],
        "proficiency": ["int", "wis"],
        "subclasses": [{"name": "Evoker"}]
    })
}

pub fn spell(name: &str, classes: &[&str]) -> Value {
    let class_list: Vec<Value> = classes
        .iter()
        .map(|class| json!({"name": class, "source": "XPHB"}))
        .collect();
    json!({
        "name": name,
        "source": "XPHB",
        "level": 3,
        "school": "V",
        "time": [{"number": 1, "unit": "action"}],
        "range": {"type": "point", "distance": {"type": "feet", "amount": 150}},
        "components": {"v": true, "s": true},
        "duration": [{"type": "instant"}],
        "classes": {"fromClassList": class_list},
        "entries": ["A bright streak flashes from your pointing finger."]
    })
}
