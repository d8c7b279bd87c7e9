//! Mapping of waiting tiers onto adapter wait gates

use crate::types::WaitTier;
use cdp_adapter::WaitGate;

pub fn gate_for_tier(tier: WaitTier) -> WaitGate {
    match tier {
        WaitTier::DomReady => WaitGate::DomReady,
        WaitTier::Load => WaitGate::Load,
        WaitTier::Idle => WaitGate::NETWORK_IDLE,
    }
}
