//! Master Handoff State Machine
//!
//! Governs conversational transfer of master authority. Three lanes exist and
//! at most one runs at a time:
//!
//! - primary gives control to a (new or existing) secondary
//! - primary takes control back from the active secondary
//! - secondary voluntarily gives control back
//!
//! The machine is pure: events go in, effects come out. Persisting records
//! and delivering messages is left to the caller, which must apply effects in
//! the order returned.

use crate::command::normalize;
use crate::{MasterRole, PrimaryConfig, Principal, SecondaryConfig};
use regex::Regex;
use std::sync::OnceLock;

/// One of the three mutually exclusive handoff lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    PrimaryGivesControl,
    PrimaryTakesControl,
    SecondaryGivesControl,
}

impl Lane {
    /// The principal whose messages drive this lane
    pub fn owner(self) -> MasterRole {
        match self {
            Lane::PrimaryGivesControl | Lane::PrimaryTakesControl => MasterRole::Primary,
            Lane::SecondaryGivesControl => MasterRole::Secondary,
        }
    }
}

/// Steps of the primary-gives-control lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveStep {
    /// Existing secondary or a new one?
    ChooseExisting,
    /// Waiting for the new secondary's mail handle
    MailHandle,
    /// Waiting for the new secondary's messaging handle
    MessagingHandle,
}

impl GiveStep {
    pub fn number(self) -> u8 {
        match self {
            GiveStep::ChooseExisting => 1,
            GiveStep::MailHandle => 2,
            GiveStep::MessagingHandle => 3,
        }
    }

    fn awaiting(self) -> &'static str {
        match self {
            GiveStep::ChooseExisting => "confirmation.",
            GiveStep::MailHandle => "the secondary master's mail handle.",
            GiveStep::MessagingHandle => "the secondary master's messaging handle.",
        }
    }
}

/// Events fed into the machine
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffEvent {
    /// CHANGE_MASTER issued; `secondary` is the persisted secondary record
    ChangeMaster {
        from: MasterRole,
        sender: String,
        secondary: Option<SecondaryConfig>,
    },
    /// CANCEL_CHANGE_MASTER issued
    Cancel { from: MasterRole, sender: String },
    /// Free text that is not a command
    Reply {
        from: MasterRole,
        sender: String,
        text: String,
    },
    /// Messaging handle reply, already looked up on the transport
    MessagingHandle {
        from: MasterRole,
        sender: String,
        handle: String,
        known: bool,
    },
}

/// Side effects the caller must apply, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffEffect {
    /// Deliver a message to a handle
    Send { to: String, text: String },
    /// Persist this secondary as active and route commands to it
    ActivateSecondary(SecondaryConfig),
    /// Deactivate the persisted secondary and route commands to the primary
    EraseSecondary,
}

#[derive(Debug, Clone)]
enum ActiveLane {
    PrimaryGives {
        step: GiveStep,
        existing: Option<SecondaryConfig>,
        pending_storage_identity: Option<String>,
    },
    PrimaryTakes {
        secondary: Principal,
    },
    SecondaryGives {
        secondary: Principal,
    },
}

impl ActiveLane {
    fn lane(&self) -> Lane {
        match self {
            ActiveLane::PrimaryGives { .. } => Lane::PrimaryGivesControl,
            ActiveLane::PrimaryTakes { .. } => Lane::PrimaryTakesControl,
            ActiveLane::SecondaryGives { .. } => Lane::SecondaryGivesControl,
        }
    }

    fn awaiting(&self) -> &'static str {
        match self {
            ActiveLane::PrimaryGives { step, .. } => step.awaiting(),
            _ => "confirmation.",
        }
    }
}

/// The handoff state machine
#[derive(Debug)]
pub struct HandoffMachine {
    parties: PrimaryConfig,
    lane: Option<ActiveLane>,
}

impl HandoffMachine {
    /// Create an idle machine for the configured primary and device
    pub fn new(parties: PrimaryConfig) -> Self {
        Self {
            parties,
            lane: None,
        }
    }

    /// The running lane, if any
    pub fn running_lane(&self) -> Option<Lane> {
        self.lane.as_ref().map(ActiveLane::lane)
    }

    /// Whether a lane owned by `role` is running
    pub fn is_running_for(&self, role: MasterRole) -> bool {
        self.running_lane().is_some_and(|lane| lane.owner() == role)
    }

    /// Step counter of the primary-gives-control lane, 0 when idle
    pub fn step(&self) -> u8 {
        match &self.lane {
            Some(ActiveLane::PrimaryGives { step, .. }) => step.number(),
            _ => 0,
        }
    }

    /// Whether the next reply must be looked up as a messaging handle
    pub fn awaits_messaging_handle(&self) -> bool {
        matches!(
            self.lane,
            Some(ActiveLane::PrimaryGives {
                step: GiveStep::MessagingHandle,
                ..
            })
        )
    }

    /// Process an event and return the effects to apply
    pub fn process_event(&mut self, event: HandoffEvent) -> Vec<HandoffEffect> {
        match event {
            HandoffEvent::ChangeMaster {
                from,
                sender,
                secondary,
            } => self.change_master(from, sender, secondary),
            HandoffEvent::Cancel { from, sender } => self.cancel(from, sender),
            HandoffEvent::Reply { from, sender, text } => {
                if !self.is_running_for(from) {
                    return Vec::new();
                }
                self.reply(sender, text.trim())
            }
            HandoffEvent::MessagingHandle {
                from,
                sender,
                handle,
                known,
            } => {
                if !self.is_running_for(from) || !self.awaits_messaging_handle() {
                    return Vec::new();
                }
                self.messaging_handle(sender, handle.trim(), known)
            }
        }
    }

    fn change_master(
        &mut self,
        from: MasterRole,
        sender: String,
        secondary: Option<SecondaryConfig>,
    ) -> Vec<HandoffEffect> {
        if let Some(active) = &self.lane {
            let owner = active.lane().owner();
            let text = if owner == from {
                format!("Already processing, waiting for {}", active.awaiting())
            } else {
                format!("Already processing change master on {owner} master's request.")
            };
            return vec![send(sender, text)];
        }

        let active_secondary = secondary.as_ref().filter(|s| s.active).map(|s| s.master.clone());

        match (from, active_secondary) {
            (MasterRole::Primary, None) => match secondary {
                Some(existing) => {
                    let text = format!(
                        "Understood, do you want to give control to {} or a new master?",
                        existing.master.messaging_handle
                    );
                    self.lane = Some(ActiveLane::PrimaryGives {
                        step: GiveStep::ChooseExisting,
                        existing: Some(existing),
                        pending_storage_identity: None,
                    });
                    vec![send(sender, text)]
                }
                None => {
                    self.lane = Some(ActiveLane::PrimaryGives {
                        step: GiveStep::MailHandle,
                        existing: None,
                        pending_storage_identity: None,
                    });
                    vec![send(
                        sender,
                        "Understood, tell me the secondary master's mail handle.",
                    )]
                }
            },
            (MasterRole::Primary, Some(current)) => {
                let text = format!(
                    "I am currently communicating with {}, are you sure you want me to communicate with you?",
                    current.messaging_handle
                );
                self.lane = Some(ActiveLane::PrimaryTakes { secondary: current });
                vec![send(self.parties.master.messaging_handle.clone(), text)]
            }
            (MasterRole::Secondary, Some(current)) => {
                let to = current.messaging_handle.clone();
                self.lane = Some(ActiveLane::SecondaryGives { secondary: current });
                vec![send(
                    to,
                    "Are you sure? If I change master, I won't be able to communicate with you.",
                )]
            }
            (MasterRole::Secondary, None) => vec![send(
                sender,
                format!(
                    "Currently I am communicating with {}.",
                    self.parties.master.messaging_handle
                ),
            )],
        }
    }

    fn cancel(&mut self, from: MasterRole, sender: String) -> Vec<HandoffEffect> {
        let Some(active) = &self.lane else {
            return vec![send(sender, "No change master in progress.")];
        };

        let owner = active.lane().owner();
        if owner != from {
            return vec![send(
                sender,
                format!("Only the {owner} master can cancel the change master in progress."),
            )];
        }

        let lane = active.lane();
        self.lane = None;

        let mut effects = Vec::new();
        if lane == Lane::PrimaryGivesControl {
            effects.push(HandoffEffect::EraseSecondary);
        }
        effects.push(send(sender, "OK, see you later."));
        effects
    }

    fn reply(&mut self, sender: String, text: &str) -> Vec<HandoffEffect> {
        let answer = normalize(text);
        let primary = self.parties.master.messaging_handle.clone();

        match self.lane.take() {
            Some(ActiveLane::PrimaryGives {
                step: GiveStep::ChooseExisting,
                existing,
                pending_storage_identity,
            }) => match (answer.as_str(), existing) {
                ("yes", Some(existing)) => self.complete_give(SecondaryConfig::active(existing.master)),
                ("no", _) => {
                    self.lane = Some(ActiveLane::PrimaryGives {
                        step: GiveStep::MailHandle,
                        existing: None,
                        pending_storage_identity: None,
                    });
                    vec![send(sender, "OK, tell me the secondary master's mail handle.")]
                }
                (_, existing) => {
                    self.lane = Some(ActiveLane::PrimaryGives {
                        step: GiveStep::ChooseExisting,
                        existing,
                        pending_storage_identity,
                    });
                    vec![send(
                        sender,
                        "I didn't understand. Please respond with \"Yes\" or \"No\".",
                    )]
                }
            },
            Some(ActiveLane::PrimaryGives {
                step: GiveStep::MailHandle,
                existing,
                pending_storage_identity,
            }) => {
                let reply = if !is_valid_mail_handle(text) {
                    format!("\"{text}\" is not a valid mail handle.")
                } else if self.parties.master.has_storage_identity(text) {
                    format!(
                        "Mail handle: {text} is already assigned to the primary master. Please provide a different mail handle."
                    )
                } else {
                    self.lane = Some(ActiveLane::PrimaryGives {
                        step: GiveStep::MessagingHandle,
                        existing,
                        pending_storage_identity: Some(text.to_string()),
                    });
                    return vec![send(
                        sender,
                        "Got it, now tell me the secondary master's messaging handle.",
                    )];
                };

                self.lane = Some(ActiveLane::PrimaryGives {
                    step: GiveStep::MailHandle,
                    existing,
                    pending_storage_identity,
                });
                vec![send(sender, reply)]
            }
            Some(lane @ ActiveLane::PrimaryGives { .. }) => {
                // Messaging handles must arrive looked up
                self.lane = Some(lane);
                vec![send(sender, "Unable to validate messaging handle.")]
            }
            Some(ActiveLane::PrimaryTakes { secondary }) => match answer.as_str() {
                "yes" => vec![
                    HandoffEffect::EraseSecondary,
                    send(
                        secondary.messaging_handle,
                        "Bye, my primary master is back. It was nice talking to you.",
                    ),
                    send(primary, "OK, I am ready to communicate with you again."),
                ],
                "no" => vec![send(primary, "OK, see you later.")],
                _ => {
                    let text = format!(
                        "I didn't understand. I am still communicating with {}, are you sure you want me to communicate with you?",
                        secondary.messaging_handle
                    );
                    self.lane = Some(ActiveLane::PrimaryTakes { secondary });
                    vec![send(primary, text)]
                }
            },
            Some(ActiveLane::SecondaryGives { secondary }) => match answer.as_str() {
                "yes" => vec![
                    HandoffEffect::EraseSecondary,
                    send(secondary.messaging_handle, "OK, bye, see you later."),
                    send(primary, "Hello, I am ready to communicate with you again."),
                ],
                "no" => vec![send(secondary.messaging_handle, "OK.")],
                _ => {
                    let to = secondary.messaging_handle.clone();
                    self.lane = Some(ActiveLane::SecondaryGives { secondary });
                    vec![send(
                        to,
                        "I didn't understand. If I change master, I won't be able to communicate with you. Are you sure?",
                    )]
                }
            },
            None => Vec::new(),
        }
    }

    fn messaging_handle(&mut self, sender: String, handle: &str, known: bool) -> Vec<HandoffEffect> {
        let text = if self.parties.master.has_handle(handle) {
            format!(
                "Messaging handle: {handle} is already assigned to the primary master. Please provide a different messaging handle."
            )
        } else if self.parties.device.has_handle(handle) {
            "You are kidding right!! :-). I cannot make myself my own master.".to_string()
        } else if !known {
            "Unable to validate messaging handle.".to_string()
        } else {
            let storage_identity = match &self.lane {
                Some(ActiveLane::PrimaryGives {
                    pending_storage_identity: Some(identity),
                    ..
                }) => identity.clone(),
                _ => return vec![send(sender, "Unable to validate messaging handle.")],
            };
            return self.complete_give(SecondaryConfig::active(Principal::new(
                handle,
                storage_identity,
            )));
        };

        vec![send(sender, text)]
    }

    fn complete_give(&mut self, secondary: SecondaryConfig) -> Vec<HandoffEffect> {
        self.lane = None;

        let primary = self.parties.master.messaging_handle.clone();
        let handle = secondary.master.messaging_handle.clone();

        vec![
            HandoffEffect::ActivateSecondary(secondary),
            send(
                primary,
                format!("Thanks, I will now communicate with the secondary master: {handle}"),
            ),
            send(
                handle,
                "Hello, you are my new master, I am ready to receive commands.",
            ),
        ]
    }
}

fn send(to: impl Into<String>, text: impl Into<String>) -> HandoffEffect {
    HandoffEffect::Send {
        to: to.into(),
        text: text.into(),
    }
}

/// Check a mail-style handle against the standard address pattern
pub fn is_valid_mail_handle(candidate: &str) -> bool {
    static MAIL: OnceLock<Regex> = OnceLock::new();
    let re = MAIL.get_or_init(|| {
        Regex::new(
            r"(?i)^[_a-z0-9+-]+(\.[_a-z0-9-]+)*@[a-z0-9-]+(\.[a-z0-9]+)*(\.[a-z]{2,})$",
        )
        .expect("valid mail regex")
    });
    re.is_match(candidate.trim())
}
