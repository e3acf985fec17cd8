//! Interface resolution (SPEC_FULL.md item C.3), generalized from the
//! teacher's `xsk/iface.rs`. The core protocol only ever depends on the
//! numeric `(ifindex, queue_id)` pair; name resolution is demo/CLI
//! ergonomics layered on top.

use std::ffi::CStr;

use crate::XskError;

/// The numeric identity of a device queue: what a bound socket is actually
/// attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IfCtx {
    pub ifindex: u32,
    pub queue_id: u32,
}

impl IfCtx {
    pub fn new(ifindex: u32, queue_id: u32) -> Self {
        IfCtx { ifindex, queue_id }
    }
}

/// A resolved interface plus the queue a socket will bind to.
#[derive(Debug, Clone, Copy)]
pub struct IfInfo {
    ctx: IfCtx,
}

impl IfInfo {
    /// An interface info with no resolved device yet.
    pub fn invalid() -> Self {
        IfInfo {
            ctx: IfCtx::new(0, 0),
        }
    }

    /// Resolve `name` to an ifindex via `if_nametoindex`.
    ///
    /// Grounded on the teacher's `IfInfo::from_name` (`xsk/iface.rs`), which
    /// performs the identical libc call; kept as real libc use since
    /// resolving interface names is host-OS business, not part of the
    /// simulated device model.
    pub fn from_name(&mut self, name: &CStr) -> Result<(), XskError> {
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(XskError::NoDev);
        }
        self.ctx.ifindex = index;
        Ok(())
    }

    /// Resolve an already-known ifindex, validating it exists.
    pub fn from_ifindex(&mut self, ifindex: u32) -> Result<(), XskError> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        let ptr = unsafe { libc::if_indextoname(ifindex, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(XskError::NoDev);
        }
        self.ctx.ifindex = ifindex;
        Ok(())
    }

    pub fn set_queue(&mut self, queue_id: u32) {
        self.ctx.queue_id = queue_id;
    }

    pub fn ifindex(&self) -> u32 {
        self.ctx.ifindex
    }

    pub fn queue_id(&self) -> u32 {
        self.ctx.queue_id
    }

    pub fn ctx(&self) -> IfCtx {
        self.ctx
    }
}
