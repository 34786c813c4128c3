//! Network reachability operations

use crate::api::{ApiContext, ApiOp, ApiRegistry, ApiUsage};
use crate::error::ScriptError;
use crate::syntax::{ApiSchema, ParamType, ParseMode};

use super::flag_param;

pub fn register(reg: &mut ApiRegistry) {
    reg.register("ping", Box::new(Ping));
}

/// `ping -h <host> [-c <count>] [-for <qaid>]`
///
/// Sends an ICMP probe through the current device and records whether the
/// device reported zero packet loss.
pub(super) struct Ping;

impl ApiOp for Ping {
    fn call(&self, ctx: &mut ApiContext<'_>, params: &[String]) -> Result<(), ScriptError> {
        let host = params.first().map(String::as_str).unwrap_or_default();
        let count = params
            .get(1)
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or(3);
        let qaid = params.get(2).map(String::as_str).unwrap_or("0").to_string();

        ctx.device
            .send_line(&format!("execute ping-options repeat-count {}", count))?;
        ctx.device.send_line(&format!("execute ping {}", host))?;
        let outcome = ctx.device.expect(r"(\d+)% packet loss", 30, false)?;
        let passed = outcome.matched && outcome.output.contains(" 0% packet loss");
        ctx.record(&qaid, passed, &outcome.output);
        Ok(())
    }

    fn usage(&self) -> ApiUsage {
        ApiUsage {
            summary: "probe a host from the current device and record reachability".into(),
            category: "net",
            schema: ApiSchema {
                name: "ping".into(),
                mode: ParseMode::Flags,
                params: vec![
                    flag_param("host", "h", ParamType::Str, true, "", 0),
                    flag_param("count", "c", ParamType::Int, false, "3", 1),
                    flag_param("qaid", "for", ParamType::Str, false, "0", 2),
                ],
            },
        }
    }
}
