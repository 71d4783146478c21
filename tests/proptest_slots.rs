//! Property tests for widget slot tables

use pagetree::position::next_position;
use pagetree::{WidgetInstance, WidgetSlotTable};
use proptest::prelude::*;

fn table_from(occupied: &[bool]) -> WidgetSlotTable {
    let mut table = WidgetSlotTable::new(occupied.len());
    for (idx, &filled) in occupied.iter().enumerate() {
        if filled {
            table.set(idx as i32, WidgetInstance::new(format!("w{}", idx))).unwrap();
        }
    }
    table
}

proptest! {
    #[test]
    fn move_swaps_exactly_two_frames(occupied in prop::collection::vec(any::<bool>(), 1..12), a in 0usize..12, b in 0usize..12) {
        let len = occupied.len();
        let (from, to) = ((a % len) as i32, (b % len) as i32);
        let original = table_from(&occupied);
        let mut table = original.clone();

        table.move_widget(from, to).unwrap();
        prop_assert_eq!(table.get(to).unwrap(), original.get(from).unwrap());
        prop_assert_eq!(table.get(from).unwrap(), original.get(to).unwrap());
        for frame in 0..len as i32 {
            if frame != from && frame != to {
                prop_assert_eq!(table.get(frame).unwrap(), original.get(frame).unwrap());
            }
        }

        // Moving back restores the table
        table.move_widget(from, to).unwrap();
        prop_assert_eq!(table, original);
    }

    #[test]
    fn out_of_range_frames_are_rejected(len in 0usize..8, frame in -20i32..20) {
        let mut table = WidgetSlotTable::new(len);
        let in_range = frame >= 0 && (frame as usize) < len;
        prop_assert_eq!(table.set(frame, WidgetInstance::new("w")).is_ok(), in_range);
        prop_assert_eq!(table.contains_frame(frame), in_range);
    }

    #[test]
    fn next_position_follows_last_child(count in 0i32..50) {
        let children: Vec<Option<i32>> = (1..=count).map(Some).collect();
        prop_assert_eq!(next_position(children), count + 1);
    }
}
