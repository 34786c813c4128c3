//! Session management operations

use crate::api::{ApiContext, ApiOp, ApiRegistry, ApiUsage};
use crate::error::ScriptError;
use crate::syntax::{ApiSchema, ParseMode};

pub fn register(reg: &mut ApiRegistry) {
    reg.register("relogin", Box::new(Relogin));
    reg.register("switch", Box::new(Switch));
}

/// `relogin`
///
/// Drops and re-establishes the current device session. Scripts use it
/// after commands that invalidate the console without rebooting.
pub(super) struct Relogin;

impl ApiOp for Relogin {
    fn call(&self, ctx: &mut ApiContext<'_>, _params: &[String]) -> Result<(), ScriptError> {
        ctx.device.force_login()
    }

    fn usage(&self) -> ApiUsage {
        ApiUsage {
            summary: "re-establish the current device session".into(),
            category: "session",
            schema: ApiSchema {
                name: "relogin".into(),
                mode: ParseMode::Positional,
                params: vec![],
            },
        }
    }
}

/// `switch`
///
/// Moves the console to the peer unit of an HA pair.
pub(super) struct Switch;

impl ApiOp for Switch {
    fn call(&self, ctx: &mut ApiContext<'_>, _params: &[String]) -> Result<(), ScriptError> {
        ctx.device.switch()
    }

    fn usage(&self) -> ApiUsage {
        ApiUsage {
            summary: "switch the console to the HA peer".into(),
            category: "session",
            schema: ApiSchema {
                name: "switch".into(),
                mode: ParseMode::Positional,
                params: vec![],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScriptedDevice;
    use crate::report::MemoryReporter;
    use crate::vars::VarTable;

    #[test]
    fn test_relogin_reaches_device() {
        let mut dev = ScriptedDevice::new("FGT1");
        let mut vars = VarTable::new();
        let mut rep = MemoryReporter::new();
        let mut ctx = ApiContext {
            device: &mut dev,
            vars: &mut vars,
            reporter: &mut rep,
            line: None,
        };
        Relogin.call(&mut ctx, &[]).unwrap();
        assert_eq!(dev.times_logged_in(), 1);
    }
}
