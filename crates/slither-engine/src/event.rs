//! Events the engine emits for broadcast.
//!
//! Events ride inside `game_data` envelopes with `dataKind: game_event` as
//! structured objects tagged by `event`.

use serde::{Deserialize, Serialize};
use slither_protocol::Slot;

use crate::Direction;

/// Why a snake died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionCause {
    /// Head ran into its own body.
    #[serde(rename = "self")]
    SelfHit,
    /// Head ran into a living opponent.
    Opponent,
}

/// One engine event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameEvent {
    /// An input passed the gate. `sequence` is global to the engine and
    /// strictly increasing, so clients can discard replays and stale
    /// reorderings.
    DirectionChanged {
        slot: Slot,
        direction: Direction,
        sequence: u64,
    },
    /// A snake ate the food; the replacement cell rides along.
    FoodEaten {
        slot: Slot,
        new_food_x: i32,
        new_food_y: i32,
    },
    /// A snake died.
    Collision { slot: Slot, cause: CollisionCause },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_changed_json_shape() {
        let event = GameEvent::DirectionChanged {
            slot: Slot(1),
            direction: Direction::Left,
            sequence: 5,
        };
        let v = serde_json::to_value(event).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "event": "direction_changed",
                "slot": 1,
                "direction": 2,
                "sequence": 5,
            })
        );
    }

    #[test]
    fn test_food_eaten_json_shape() {
        let event = GameEvent::FoodEaten {
            slot: Slot(2),
            new_food_x: 12,
            new_food_y: 7,
        };
        let v = serde_json::to_value(event).unwrap();
        assert_eq!(v["event"], "food_eaten");
        assert_eq!(v["newFoodX"], 12);
        assert_eq!(v["newFoodY"], 7);
    }

    #[test]
    fn test_collision_cause_wire_strings() {
        let own = GameEvent::Collision {
            slot: Slot(1),
            cause: CollisionCause::SelfHit,
        };
        let other = GameEvent::Collision {
            slot: Slot(2),
            cause: CollisionCause::Opponent,
        };
        assert_eq!(serde_json::to_value(own).unwrap()["cause"], "self");
        assert_eq!(serde_json::to_value(other).unwrap()["cause"], "opponent");
    }

    #[test]
    fn test_event_round_trip() {
        let event = GameEvent::DirectionChanged {
            slot: Slot(2),
            direction: Direction::Up,
            sequence: 41,
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: GameEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
