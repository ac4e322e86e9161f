//! Device enumeration and attachment.
//!
//! The daemon's `DeviceList` reply is the only source of device identity,
//! and it is ordering-based: the wire protocol has no stable identifier, so
//! a re-poll may reshuffle meaning if devices appeared or disappeared. The
//! directory therefore mints a synthetic [`DeviceToken`] per enumerated
//! entry and invalidates all tokens whenever the list is replaced; attaching
//! with a token from a superseded enumeration fails with `StaleDevice`
//! instead of silently binding to whatever now sits at the old index.
//!
//! Attachment is a two-step protocol: an `Attach` frame (never acknowledged
//! by the daemon), then — after a settle delay, because the daemon completes
//! attachment asynchronously — an `Info` probe whose reply confirms
//! liveness. Only a successful probe sets the attached reference.

use crate::error::BridgeError;

/// Synthetic identifier for one enumerated device.
///
/// Valid only for the enumeration that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken(u64);

/// One selectable device, as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Token for this enumeration.
    pub token: DeviceToken,
    /// Display URI reported by the daemon; also the `Attach` operand.
    pub uri: String,
}

/// Directives returned by the directory for the bridge to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryAction {
    /// Issue a `DeviceList` request.
    RequestList,
    /// Re-poll after the discovery interval (the list came back empty).
    SchedulePoll,
    /// Send an `Attach` frame and start the settle timer for the probe.
    SendAttach {
        /// Device URI to attach to.
        uri: String,
    },
    /// Issue the `Info` liveness probe (settle timer fired).
    ProbeInfo,
    /// The probe succeeded; the attached reference is now set.
    Confirmed {
        /// URI of the attached device.
        uri: String,
    },
    /// The probe failed; the attached reference stays unset.
    AttachFailed {
        /// URI of the device that failed to attach.
        uri: String,
    },
}

/// Tracks enumerated devices and the at-most-one attached device.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: Vec<Device>,
    next_token: u64,
    /// Confirmed attachment; set only after a successful Info probe.
    attached: Option<Device>,
    /// Attach issued, probe outcome pending.
    probing: Option<Device>,
    /// Explicit selection, kept across re-polls and reconnects for resume.
    requested_uri: Option<String>,
}

impl DeviceDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently enumerated devices.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// URI of the confirmed attached device, if any.
    pub fn attached_uri(&self) -> Option<&str> {
        self.attached.as_ref().map(|d| d.uri.as_str())
    }

    /// Whether a device attachment has been confirmed.
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// A console session opened: enumerate immediately.
    ///
    /// Any previous attachment belonged to the old session and is cleared.
    pub fn on_console_open(&mut self) -> Vec<DirectoryAction> {
        self.attached = None;
        self.probing = None;
        vec![DirectoryAction::RequestList]
    }

    /// Replace the device set atomically from a `DeviceList` reply.
    ///
    /// The previous list is discarded entirely and all outstanding tokens
    /// become stale. Selection rules, in order: a previously requested
    /// device still present resumes attachment; otherwise a sole device with
    /// no explicit selection auto-attaches; otherwise wait for a caller.
    pub fn replace_list(&mut self, uris: Vec<String>) -> Vec<DirectoryAction> {
        self.devices = uris
            .into_iter()
            .map(|uri| {
                let token = DeviceToken(self.next_token);
                self.next_token += 1;
                Device { token, uri }
            })
            .collect();

        if self.devices.is_empty() {
            return vec![DirectoryAction::SchedulePoll];
        }

        if let Some(requested) = &self.requested_uri {
            if let Some(device) = self.devices.iter().find(|d| &d.uri == requested).cloned() {
                return self.begin_attach(device);
            }
            tracing::info!(uri = %requested, "requested device absent from enumeration");
            return Vec::new();
        }

        if self.devices.len() == 1 {
            let device = self.devices[0].clone();
            return self.begin_attach(device);
        }

        Vec::new()
    }

    /// The discovery poll timer fired: enumerate again.
    pub fn on_poll_timer(&self) -> Vec<DirectoryAction> {
        if self.devices.is_empty() { vec![DirectoryAction::RequestList] } else { Vec::new() }
    }

    /// Caller selected a device from the current enumeration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StaleDevice`] if the token does not resolve in
    /// the current list.
    pub fn request_attach(&mut self, token: DeviceToken) -> Result<Vec<DirectoryAction>, BridgeError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.token == token)
            .cloned()
            .ok_or(BridgeError::StaleDevice { token })?;

        self.requested_uri = Some(device.uri.clone());
        Ok(self.begin_attach(device))
    }

    /// Caller selected a device by URI (e.g. from configuration).
    ///
    /// If the URI is not currently enumerated, the request is remembered and
    /// attachment resumes on the next enumeration that contains it.
    pub fn request_attach_by_uri(&mut self, uri: String) -> Vec<DirectoryAction> {
        if let Some(device) = self.devices.iter().find(|d| d.uri == uri).cloned() {
            self.requested_uri = Some(uri);
            return self.begin_attach(device);
        }

        tracing::info!(%uri, "device not enumerated yet; will attach when it appears");
        self.requested_uri = Some(uri);
        Vec::new()
    }

    /// Caller reset the selection: clear the attachment and the request.
    pub fn detach(&mut self) {
        self.attached = None;
        self.probing = None;
        self.requested_uri = None;
    }

    /// The attach settle timer fired: probe liveness.
    pub fn on_probe_timer(&self) -> Vec<DirectoryAction> {
        if self.probing.is_some() { vec![DirectoryAction::ProbeInfo] } else { Vec::new() }
    }

    /// The `Info` probe resolved.
    ///
    /// Success transitions the probing device into the attached reference;
    /// failure leaves the reference unset.
    pub fn on_info_result(&mut self, ok: bool) -> Vec<DirectoryAction> {
        let Some(device) = self.probing.take() else {
            tracing::warn!("Info resolved with no probe outstanding");
            return Vec::new();
        };

        if ok {
            let uri = device.uri.clone();
            self.attached = Some(device);
            vec![DirectoryAction::Confirmed { uri }]
        } else {
            vec![DirectoryAction::AttachFailed { uri: device.uri }]
        }
    }

    /// The console session closed: the attachment and the enumeration die
    /// with it (device tokens are meaningless without the session that
    /// enumerated them).
    ///
    /// The explicit request survives so a reconnect can resume it.
    pub fn on_console_closed(&mut self) {
        self.attached = None;
        self.probing = None;
        self.devices.clear();
    }

    fn begin_attach(&mut self, device: Device) -> Vec<DirectoryAction> {
        let uri = device.uri.clone();
        self.attached = None;
        self.probing = Some(device);
        vec![DirectoryAction::SendAttach { uri }]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uris(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn empty_list_schedules_exactly_one_poll() {
        let mut directory = DeviceDirectory::new();
        let actions = directory.replace_list(Vec::new());
        assert_eq!(actions, vec![DirectoryAction::SchedulePoll]);
    }

    #[test]
    fn poll_timer_requests_list_only_while_empty() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(Vec::new());
        assert_eq!(directory.on_poll_timer(), vec![DirectoryAction::RequestList]);

        directory.replace_list(uris(&["a", "b"]));
        assert!(directory.on_poll_timer().is_empty());
    }

    #[test]
    fn sole_device_auto_attaches() {
        let mut directory = DeviceDirectory::new();
        let actions = directory.replace_list(uris(&["SD2SNES COM3"]));
        assert_eq!(actions, vec![DirectoryAction::SendAttach { uri: "SD2SNES COM3".to_owned() }]);
    }

    #[test]
    fn multiple_devices_wait_for_selection() {
        let mut directory = DeviceDirectory::new();
        let actions = directory.replace_list(uris(&["a", "b"]));
        assert!(actions.is_empty());
        assert_eq!(directory.devices().len(), 2);
    }

    #[test]
    fn explicit_request_resumes_across_repoll() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a", "b"]));
        let token = directory.devices()[1].token;
        directory.request_attach(token).unwrap();
        directory.on_info_result(true);

        // Re-poll still containing the requested device resumes it.
        let actions = directory.replace_list(uris(&["c", "b"]));
        assert_eq!(actions, vec![DirectoryAction::SendAttach { uri: "b".to_owned() }]);
    }

    #[test]
    fn sole_device_does_not_override_explicit_request() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a", "b"]));
        let token = directory.devices()[0].token;
        directory.request_attach(token).unwrap();

        // "a" disappeared; the sole remaining device must not auto-attach
        // over the explicit request for "a".
        let actions = directory.replace_list(uris(&["b"]));
        assert!(actions.is_empty());
    }

    #[test]
    fn stale_token_is_rejected() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a"]));
        let token = directory.devices()[0].token;

        directory.replace_list(uris(&["a"]));
        let err = directory.request_attach(token).unwrap_err();
        assert!(matches!(err, BridgeError::StaleDevice { .. }));
    }

    #[test]
    fn probe_success_sets_attachment() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a"]));
        assert!(!directory.is_attached());

        assert_eq!(directory.on_probe_timer(), vec![DirectoryAction::ProbeInfo]);
        let actions = directory.on_info_result(true);
        assert_eq!(actions, vec![DirectoryAction::Confirmed { uri: "a".to_owned() }]);
        assert_eq!(directory.attached_uri(), Some("a"));
    }

    #[test]
    fn probe_failure_leaves_attachment_unset() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a"]));

        let actions = directory.on_info_result(false);
        assert_eq!(actions, vec![DirectoryAction::AttachFailed { uri: "a".to_owned() }]);
        assert!(!directory.is_attached());
    }

    #[test]
    fn probe_timer_without_probe_is_noop() {
        let directory = DeviceDirectory::new();
        assert!(directory.on_probe_timer().is_empty());
    }

    #[test]
    fn detach_clears_request_and_attachment() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a"]));
        directory.on_info_result(true);
        assert!(directory.is_attached());

        directory.detach();
        assert!(!directory.is_attached());

        // No resume on the next enumeration, and a sole device auto-attaches
        // again because the explicit request is gone.
        let actions = directory.replace_list(uris(&["b"]));
        assert_eq!(actions, vec![DirectoryAction::SendAttach { uri: "b".to_owned() }]);
    }

    #[test]
    fn console_close_clears_attachment_but_keeps_request() {
        let mut directory = DeviceDirectory::new();
        directory.replace_list(uris(&["a", "b"]));
        let token = directory.devices()[0].token;
        directory.request_attach(token).unwrap();
        directory.on_info_result(true);

        directory.on_console_closed();
        assert!(!directory.is_attached());

        // Reconnect enumerates again and resumes the request by URI.
        let mut actions = directory.on_console_open();
        assert_eq!(actions, vec![DirectoryAction::RequestList]);
        actions = directory.replace_list(uris(&["a"]));
        assert_eq!(actions, vec![DirectoryAction::SendAttach { uri: "a".to_owned() }]);
    }
}
