//! Role-based authorization for workflow operations.

use std::collections::HashSet;

use assignment::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ClaimOrders,
    /// Release assignments the actor itself holds.
    ReleaseOwn,
    /// Release any worker's assignment.
    ReleaseAny,
    RunReconciliation,
    ViewHistory,
    ManageWorkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Worker,
    Supervisor,
    Admin,
}

impl Role {
    pub fn capabilities(&self) -> HashSet<Capability> {
        use Capability::*;
        match self {
            Role::Worker => HashSet::from([ClaimOrders, ReleaseOwn, ViewHistory]),
            Role::Supervisor => {
                HashSet::from([ClaimOrders, ReleaseOwn, ReleaseAny, RunReconciliation, ViewHistory])
            }
            Role::Admin => HashSet::from([
                ClaimOrders,
                ReleaseOwn,
                ReleaseAny,
                RunReconciliation,
                ViewHistory,
                ManageWorkers,
            ]),
        }
    }
}

/// Identity of the actor behind one operation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub worker_id: WorkerId,
    pub role: Role,
}

impl AuthContext {
    pub fn new(worker_id: WorkerId, role: Role) -> Self {
        Self { worker_id, role }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }

    /// Owner-or-supervisor check used by release.
    pub fn may_release(&self, owner: WorkerId) -> bool {
        if self.worker_id == owner {
            return self.can(Capability::ReleaseOwn);
        }
        self.can(Capability::ReleaseAny)
    }
}
