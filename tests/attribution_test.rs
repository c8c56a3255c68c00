//! Module attribution against a synthetic module list

use proptest::prelude::*;
use vtable_probe::host::mock::MockHost;
use vtable_probe::{Address, Attribution, ModuleAttributor, ModuleInfo, Protection};

const GAME_BASE: usize = 0x0040_0000;
const GAME_SIZE: usize = 0x00C0_0000;
const HOOK_BASE: usize = 0x6A00_0000;
const HOOK_SIZE: usize = 0x0002_0000;
const HEAP: usize = 0x0300_0000;
const HEAP_SIZE: usize = 0x0010_0000;

fn host() -> MockHost {
    let host = MockHost::new(4);
    host.add_module(ModuleInfo::new("game.exe", Address::new(GAME_BASE), GAME_SIZE));
    host.add_module(ModuleInfo::new("p2p_hook.dll", Address::new(HOOK_BASE), HOOK_SIZE));
    host.map_region(HEAP, HEAP_SIZE, Protection::READ_WRITE);
    host
}

proptest! {
    #[test]
    fn addresses_inside_a_module_are_owned_with_their_offset(offset in 0usize..HOOK_SIZE) {
        let host = host();
        let attribution = ModuleAttributor::new(&host)
            .attribute(Address::new(HOOK_BASE + offset))
            .unwrap();

        match attribution {
            Attribution::Owned { module, offset: reported } => {
                prop_assert_eq!(module.name.as_str(), "p2p_hook.dll");
                prop_assert_eq!(reported, offset);
            }
            other => prop_assert!(false, "expected owned, got {:?}", other),
        }
    }

    #[test]
    fn heap_addresses_report_protection(offset in 0usize..HEAP_SIZE) {
        let host = host();
        let attribution = ModuleAttributor::new(&host)
            .attribute(Address::new(HEAP + offset))
            .unwrap();
        prop_assert_eq!(attribution, Attribution::Unowned { protection: Protection::READ_WRITE });
    }

    #[test]
    fn addresses_past_a_module_end_are_not_owned(past in 0usize..0x1000) {
        let host = host();
        let attribution = ModuleAttributor::new(&host)
            .attribute(Address::new(HOOK_BASE + HOOK_SIZE + past))
            .unwrap();
        prop_assert_eq!(attribution, Attribution::Unmapped);
    }
}

#[test]
fn test_module_list_is_queried_per_call() {
    let host = host();
    let late = Address::new(0x7100_0040);
    assert_eq!(ModuleAttributor::new(&host).attribute(late).unwrap(), Attribution::Unmapped);

    host.add_module(ModuleInfo::new("late.dll", Address::new(0x7100_0000), 0x1000));
    let attribution = ModuleAttributor::new(&host).attribute(late).unwrap();
    assert_eq!(attribution.module().map(|m| m.name.as_str()), Some("late.dll"));
}

#[test]
fn test_display_forms() {
    let host = host();
    let attributor = ModuleAttributor::new(&host);

    let owned = attributor.attribute(Address::new(GAME_BASE + 0x7F_7758)).unwrap();
    assert!(owned.to_string().starts_with("game.exe+0x7F7758"));

    let heap = attributor.attribute(Address::new(HEAP)).unwrap();
    assert_eq!(heap.to_string(), "no module, protection rw-");

    let nothing = attributor.attribute(Address::new(0x10)).unwrap();
    assert_eq!(nothing.to_string(), "no module, unmapped");
}
