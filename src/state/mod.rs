//! The printer's hierarchical state machine.
//!
//! States form a fixed tree rooted at [`StateId::Top`]. A transition walks up
//! from the current state until it reaches an ancestor of the target, then
//! down to the target, calling the leave and enter hooks on the way.

use std::time::Duration;

mod define;
mod machine;
mod printing;

pub(crate) use machine::Machine;

/// Resends of a command the printer reported as malformed.
pub const MAX_RESEND_CNT: u8 = 3;

pub(crate) const ALIVE_TIMEOUT: Duration = Duration::from_millis(2000);
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(300);
pub(crate) const FLASH_SETTLE_TIME: Duration = Duration::from_millis(2000);
pub(crate) const FLASH_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Identifies a state. The discriminants are the numeric state ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Top = 0,
    UnInit = 1,
    Init = 2,
    Disconnected = 3,
    Ready = 4,
    Suspended = 10,
    GatReport = 11,
    Crc = 12,
    Idle = 13,
    DefineGraphic = 14,
    DeleteGraphic = 15,
    AddGraphic = 16,
    DefineRegion = 17,
    DeleteRegion = 18,
    AddRegion = 19,
    DefineTemplate = 20,
    DeleteTemplate = 21,
    AddTemplate = 22,
    FlashTransfer = 23,
    CompleteFlashTransfer = 24,
    Printing = 25,
}

/// Every state with its parent, parents listed before their children.
const TREE: [(StateId, Option<StateId>); 21] = {
    use StateId::*;
    [
        (Top, None),
        (UnInit, Some(Top)),
        (Init, Some(Top)),
        (Disconnected, Some(Top)),
        (Ready, Some(Top)),
        (Suspended, Some(Ready)),
        (GatReport, Some(Ready)),
        (Crc, Some(Ready)),
        (Idle, Some(Ready)),
        (DefineGraphic, Some(Ready)),
        (DeleteGraphic, Some(DefineGraphic)),
        (AddGraphic, Some(DefineGraphic)),
        (DefineRegion, Some(Ready)),
        (DeleteRegion, Some(DefineRegion)),
        (AddRegion, Some(DefineRegion)),
        (DefineTemplate, Some(Ready)),
        (DeleteTemplate, Some(DefineTemplate)),
        (AddTemplate, Some(DefineTemplate)),
        (FlashTransfer, Some(DefineTemplate)),
        (CompleteFlashTransfer, Some(DefineTemplate)),
        (Printing, Some(Ready)),
    ]
};

impl StateId {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Position in the state arena. Ids 5..=9 are unused.
    const fn index(self) -> usize {
        let code = self as usize;
        if code < 10 {
            code
        } else {
            code - 5
        }
    }

    /// States that accept `uninit`.
    pub(crate) fn is_initialized(self) -> bool {
        !matches!(
            self,
            StateId::Top
                | StateId::UnInit
                | StateId::Ready
                | StateId::DefineGraphic
                | StateId::DefineRegion
                | StateId::DefineTemplate
        )
    }
}

/// Countdown driven by the elapsed times passed to `run`.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Timer {
    expiry: Duration,
    elapsed: Duration,
}

impl Timer {
    pub const fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            elapsed: Duration::from_millis(0),
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::from_millis(0);
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.elapsed = self.elapsed.saturating_add(elapsed);
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.expiry
    }
}

/// Status polling shared by most connected states.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Poller {
    pub alive: Timer,
    pub poll: Timer,
    /// A status request went out since the last command was sent.
    pub polled: bool,
}

impl Poller {
    const fn new() -> Self {
        Self {
            alive: Timer::new(ALIVE_TIMEOUT),
            poll: Timer::new(POLL_INTERVAL),
            polled: false,
        }
    }

    pub fn reset(&mut self) {
        self.alive.reset();
        self.poll.reset();
        self.polled = false;
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.alive.advance(elapsed);
        self.poll.advance(elapsed);
    }
}

#[derive(Debug)]
pub(crate) enum StateData {
    Plain,
    Polling(Poller),
    Disconnected {
        poll: Timer,
    },
    FlashTransfer {
        settle: Timer,
    },
    CompleteFlashTransfer {
        poll: Timer,
        disconnect: Timer,
    },
    Printing {
        poller: Poller,
        suspend_pending: bool,
    },
}

impl StateData {
    fn for_state(id: StateId) -> Self {
        use StateId::*;
        match id {
            Top | UnInit | Ready | DefineGraphic | DefineRegion | DefineTemplate => {
                StateData::Plain
            }
            Disconnected => StateData::Disconnected {
                poll: Timer::new(POLL_INTERVAL),
            },
            FlashTransfer => StateData::FlashTransfer {
                settle: Timer::new(FLASH_SETTLE_TIME),
            },
            CompleteFlashTransfer => StateData::CompleteFlashTransfer {
                poll: Timer::new(POLL_INTERVAL),
                disconnect: Timer::new(FLASH_DISCONNECT_TIMEOUT),
            },
            Printing => StateData::Printing {
                poller: Poller::new(),
                suspend_pending: false,
            },
            Init | Suspended | GatReport | Crc | Idle | DeleteGraphic | AddGraphic
            | DeleteRegion | AddRegion | DeleteTemplate | AddTemplate => {
                StateData::Polling(Poller::new())
            }
        }
    }

    pub fn poller(&self) -> Option<&Poller> {
        match self {
            StateData::Polling(poller) | StateData::Printing { poller, .. } => Some(poller),
            _ => None,
        }
    }

    pub fn poller_mut(&mut self) -> Option<&mut Poller> {
        match self {
            StateData::Polling(poller) | StateData::Printing { poller, .. } => Some(poller),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub id: StateId,
    pub parent: Option<StateId>,
    pub children: Vec<StateId>,
    pub resend_count: u8,
    pub data: StateData,
}

/// Arena of all states, indexed by [`StateId::index`].
#[derive(Debug)]
pub(crate) struct StateTree {
    nodes: Vec<Node>,
}

impl StateTree {
    pub fn new() -> Self {
        let mut nodes: Vec<Node> = TREE
            .iter()
            .map(|&(id, parent)| Node {
                id,
                parent,
                children: Vec::new(),
                resend_count: 0,
                data: StateData::for_state(id),
            })
            .collect();
        for &(id, parent) in TREE.iter() {
            if let Some(parent) = parent {
                nodes[parent.index()].children.push(id);
            }
        }
        Self { nodes }
    }

    pub fn node(&self, id: StateId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: StateId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// The child of `from` on the path down to `target`, if `target` is a
    /// descendant of `from`.
    pub fn child_towards(&self, from: StateId, target: StateId) -> Option<StateId> {
        self.node(from)
            .children
            .iter()
            .copied()
            .find(|&child| child == target || self.child_towards(child, target).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree() {
        let tree = StateTree::new();
        for (i, &(id, parent)) in TREE.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(tree.node(id).id, id);
            assert_eq!(tree.node(id).parent, parent);
        }
        assert_eq!(
            tree.node(StateId::Top).children,
            vec![
                StateId::UnInit,
                StateId::Init,
                StateId::Disconnected,
                StateId::Ready
            ]
        );
        assert_eq!(tree.node(StateId::Ready).children.len(), 8);
        assert_eq!(StateId::Printing.code(), 25);
    }

    #[test]
    fn test_child_towards() {
        let tree = StateTree::new();
        assert_eq!(
            tree.child_towards(StateId::Top, StateId::AddRegion),
            Some(StateId::Ready)
        );
        assert_eq!(
            tree.child_towards(StateId::Ready, StateId::AddRegion),
            Some(StateId::DefineRegion)
        );
        assert_eq!(tree.child_towards(StateId::Idle, StateId::AddRegion), None);
        assert_eq!(tree.child_towards(StateId::Idle, StateId::Idle), None);
    }

    #[test]
    fn test_timer() {
        let mut timer = Timer::new(Duration::from_millis(300));
        timer.advance(Duration::from_millis(299));
        assert!(!timer.is_expired());
        timer.advance(Duration::from_millis(1));
        assert!(timer.is_expired());
        timer.reset();
        assert!(!timer.is_expired());
    }

    #[test]
    fn test_initialized_family() {
        assert!(StateId::Printing.is_initialized());
        assert!(StateId::Disconnected.is_initialized());
        assert!(StateId::CompleteFlashTransfer.is_initialized());
        assert!(!StateId::Ready.is_initialized());
        assert!(!StateId::DefineTemplate.is_initialized());
    }
}
