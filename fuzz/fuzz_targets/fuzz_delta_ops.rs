#![no_main]

use arbitrary::Arbitrary;
use blb_core::{EntryKind, FileData, Grid, LevelMeta, Position, TileState, Version, diff};
use libfuzzer_sys::fuzz_target;

const KINDS: [&str; 4] = ["Wall", "Coin", "Spike", "Door"];

#[derive(Debug, Arbitrary)]
enum Op {
    Place { x: u8, y: u8, kind: u8 },
    Erase { x: u8, y: u8 },
    ManualSave,
    AutoSave,
    DeleteOldest,
    PromoteNewestAuto,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut live = Grid::new();
    let mut data = FileData::default();
    let mut cursor = Version::NONE;

    for op in ops.into_iter().take(64) {
        match op {
            Op::Place { x, y, kind } => {
                let position = Position::new(i32::from(x % 8), i32::from(y % 8));
                let state = TileState::new(KINDS[usize::from(kind) % KINDS.len()]);
                live.insert(position, state);
            }
            Op::Erase { x, y } => {
                live.remove(&Position::new(i32::from(x % 8), i32::from(y % 8)));
            }
            Op::ManualSave => {
                let base = data.reconstruct(None).into_grid();
                let (next, version) =
                    data.appended(diff(&base, &live), LevelMeta::default(), EntryKind::Manual, cursor);
                data = next;
                cursor = version;
            }
            Op::AutoSave => {
                let base = data.reconstruct(Some(cursor.branch())).into_grid();
                let (next, version) =
                    data.appended(diff(&base, &live), LevelMeta::default(), EntryKind::Auto, cursor);
                data = next;
                cursor = version;
            }
            Op::DeleteOldest => {
                if let Some(first) = data.manual_saves.first().map(|l| l.version) {
                    let (next, moved) = data.delete_versions(&[first], cursor).expect("delete existing");
                    data = next;
                    cursor = moved;
                }
            }
            Op::PromoteNewestAuto => {
                if let Some(newest) = data.auto_saves.last().map(|l| l.version) {
                    let expected = data.reconstruct(Some(newest)).into_grid();
                    data = data.promote_auto_saves(&[newest]).expect("promote existing");
                    let promoted = Version::manual(newest.manual + 1);
                    assert_eq!(data.reconstruct(Some(promoted)).into_grid(), expected);
                    cursor = promoted;
                }
            }
        }

        let problems = data.validate();
        assert!(problems.is_empty(), "graph invariants broken: {problems:?}");
    }
});
