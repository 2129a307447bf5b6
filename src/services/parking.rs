//! Request orchestration for all three channels
//!
//! Every request follows the same path: resolve the intent, run the
//! cross-operator guard, look up the transaction, then compute a fee or a
//! duration or push a payment. Each channel renders the outcome its own way.
//! The caller passes in the `now` captured at request entry.

use crate::domain::error::{BestEffort, GuardedAction, ParkingError};
use crate::domain::tariff::{stay_minutes, TariffRule};
use crate::domain::types::{
    Channel, Intent, Operator, PaymentTarget, Plate, SessionInput, VehicleTransaction,
};
use crate::infra::config::{Branding, Config, CrossOperatorPolicy};
use crate::infra::metrics::Metrics;
use crate::io::operator_fees::OperatorFeeLookup;
use crate::io::payment::PaymentGateway;
use crate::io::store::TransactionStore;
use crate::io::whatsapp::{Notifier, PaymentPrompt};
use crate::services::replies::{self, IvrReply, UssdReply};
use crate::services::router::{Router, RoutingTable};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, error, info};

/// External systems the service talks to
#[derive(Clone)]
pub struct Collaborators {
    pub operator_a: Arc<dyn TransactionStore>,
    pub operator_b: Arc<dyn TransactionStore>,
    pub operator_b_fees: Arc<dyn OperatorFeeLookup>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

/// Amount owed, tagged with the operator that computed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountDue {
    pub operator: Operator,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment provider accepted the push
    PromptSent,
    /// The push was not sent; the stay is assumed to still be free
    WithinFreePeriod { remaining_minutes: u64 },
}

pub struct ParkingService {
    router: Router,
    tariff: TariffRule,
    branding: Branding,
    currency: String,
    policy: CrossOperatorPolicy,
    ivr_max_vehicles: usize,
    template_amount: u64,
    operator_a: Arc<dyn TransactionStore>,
    operator_b: Arc<dyn TransactionStore>,
    operator_b_fees: Arc<dyn OperatorFeeLookup>,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl ParkingService {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
        metrics: Arc<Metrics>,
    ) -> Result<Self, regex::Error> {
        let router = Router::new(RoutingTable::ussd(config.ussd_sentinel())?);
        Ok(Self {
            router,
            tariff: config.tariff().clone(),
            branding: config.branding().clone(),
            currency: config.currency().to_string(),
            policy: config.cross_operator_policy(),
            ivr_max_vehicles: config.ivr_max_vehicles(),
            template_amount: config.whatsapp().template_amount,
            operator_a: collaborators.operator_a,
            operator_b: collaborators.operator_b,
            operator_b_fees: collaborators.operator_b_fees,
            payments: collaborators.payments,
            notifier: collaborators.notifier,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Which operator handles a plate, per the cross-operator policy.
    ///
    /// A failed Operator B lookup fails the request rather than assuming A.
    async fn owner_of(&self, plate: &Plate) -> Result<Operator, ParkingError> {
        let in_b = self
            .operator_b
            .exists(plate)
            .await
            .map_err(|e| ParkingError::upstream("operator_b_store", e))?;
        if !in_b {
            return Ok(Operator::A);
        }

        match self.policy {
            CrossOperatorPolicy::PreferOperatorB => Ok(Operator::B),
            CrossOperatorPolicy::PreferOperatorA | CrossOperatorPolicy::Reject => {
                let in_a = self
                    .operator_a
                    .exists(plate)
                    .await
                    .map_err(|e| ParkingError::upstream("operator_a_store", e))?;
                match (in_a, self.policy) {
                    (false, _) => Ok(Operator::B),
                    (true, CrossOperatorPolicy::PreferOperatorA) => Ok(Operator::A),
                    (true, _) => Err(ParkingError::CrossOperatorConflict {
                        plate: plate.clone(),
                        action: GuardedAction::DualOwnership,
                    }),
                }
            }
        }
    }

    /// Refuse `action` when the plate belongs to Operator B
    async fn guard(&self, plate: &Plate, action: GuardedAction) -> Result<(), ParkingError> {
        match self.owner_of(plate).await? {
            Operator::A => Ok(()),
            Operator::B => {
                Err(ParkingError::CrossOperatorConflict { plate: plate.clone(), action })
            }
        }
    }

    async fn current_transaction(&self, plate: &Plate) -> Result<VehicleTransaction, ParkingError> {
        self.operator_a
            .latest_transaction(plate)
            .await
            .map_err(|e| ParkingError::upstream("operator_a_store", e))?
            .ok_or_else(|| ParkingError::NotFound(plate.clone()))
    }

    /// Remember who asked about a transaction. Never fails the request.
    async fn link_phone(&self, transaction: &VehicleTransaction, phone: &str) {
        if phone.is_empty() {
            return;
        }
        let outcome = BestEffort::from_result(
            "link_phone",
            self.operator_a.link_phone(transaction.id, phone).await,
        );
        if outcome.acknowledge() {
            self.metrics.record_best_effort_failure();
        } else {
            debug!(plate = %transaction.plate, phone = %phone, id = %transaction.id, "phone_linked");
        }
    }

    async fn partner_fee(&self, plate: &Plate) -> Result<AmountDue, ParkingError> {
        let amount = self
            .operator_b_fees
            .fee_due(plate)
            .await
            .map_err(|e| ParkingError::upstream("operator_b_fee_lookup", e))?;
        Ok(AmountDue { operator: Operator::B, amount })
    }

    /// Amount owed right now.
    ///
    /// Operator A requests for a plate owned by B are answered by B's fee lookup.
    pub async fn amount_due(
        &self,
        plate: &Plate,
        operator: Operator,
        phone: &str,
        now: NaiveDateTime,
    ) -> Result<AmountDue, ParkingError> {
        if operator == Operator::B || self.owner_of(plate).await? == Operator::B {
            let due = self.partner_fee(plate).await?;
            info!(plate = %plate, amount = %due.amount, operator = %Operator::B.as_str(), "amount_due");
            return Ok(due);
        }

        let transaction = self.current_transaction(plate).await?;
        self.link_phone(&transaction, phone).await;
        let amount = self.tariff.compute_fee(transaction.entry_time, now);
        self.metrics.record_fee_computed();
        info!(
            plate = %plate,
            entry_time = %transaction.entry_time,
            minutes = %stay_minutes(transaction.entry_time, now),
            day_entry = %self.tariff.is_day_entry(transaction.entry_time),
            amount = %amount,
            operator = %Operator::A.as_str(),
            "amount_due"
        );
        Ok(AmountDue { operator: Operator::A, amount })
    }

    /// Whole minutes since entry
    pub async fn time_stayed(
        &self,
        plate: &Plate,
        phone: &str,
        now: NaiveDateTime,
    ) -> Result<u64, ParkingError> {
        self.guard(plate, GuardedAction::Duration).await?;
        let transaction = self.current_transaction(plate).await?;
        self.link_phone(&transaction, phone).await;
        let minutes = stay_minutes(transaction.entry_time, now);
        info!(plate = %plate, minutes = %minutes, "time_stayed");
        Ok(minutes)
    }

    /// Push an M-Pesa prompt to `pay_phone` for the plate's current stay
    pub async fn initiate_payment(
        &self,
        plate: &Plate,
        pay_phone: &str,
        now: NaiveDateTime,
    ) -> Result<PaymentOutcome, ParkingError> {
        self.guard(plate, GuardedAction::Payment).await?;
        let transaction = self.current_transaction(plate).await?;
        self.link_phone(&transaction, pay_phone).await;

        let push = self.payments.initiate_push(plate, pay_phone).await;
        self.metrics.record_push(push.is_sent());
        if push.is_sent() {
            info!(plate = %plate, phone = %pay_phone, "payment_prompt_sent");
            return Ok(PaymentOutcome::PromptSent);
        }

        let remaining_minutes = self.tariff.free_minutes_remaining(transaction.entry_time, now);
        info!(
            plate = %plate,
            code = %push.code,
            remaining_minutes = %remaining_minutes,
            "payment_prompt_not_sent"
        );
        Ok(PaymentOutcome::WithinFreePeriod { remaining_minutes })
    }

    fn note_error(&self, channel: Channel, err: &ParkingError) {
        self.metrics.record_error(err);
        match err {
            ParkingError::Upstream { context, detail } => {
                error!(channel = %channel.as_str(), context = %context, error = %detail, "request_failed")
            }
            ParkingError::MalformedInput(detail) => {
                debug!(channel = %channel.as_str(), detail = %detail, "malformed_input")
            }
            other => info!(channel = %channel.as_str(), kind = %other.kind(), error = %other, "request_refused"),
        }
    }

    fn payment_text(&self, outcome: &PaymentOutcome) -> String {
        match outcome {
            PaymentOutcome::PromptSent => replies::payment_sent(&self.branding),
            PaymentOutcome::WithinFreePeriod { remaining_minutes } => {
                replies::within_free_period(self.tariff.day_free_minutes(), *remaining_minutes)
            }
        }
    }

    fn amount_text(&self, plate: &Plate, due: AmountDue) -> String {
        match due.operator {
            Operator::A => replies::amount_due(&self.currency, due.amount),
            Operator::B => replies::partner_amount_due(&self.currency, plate, due.amount),
        }
    }

    /// Handle one USSD hop. Always produces a reply.
    pub async fn handle_ussd(&self, input: &SessionInput, now: NaiveDateTime) -> UssdReply {
        self.metrics.record_request(Channel::Ussd);
        let intent = self.router.resolve(Channel::Ussd, &input.raw_text);
        debug!(text = %input.raw_text, phone = %input.phone, intent = %intent.as_str(), "ussd_request");

        let result = match intent {
            Intent::ShowWelcomeMenu => Ok(UssdReply::Continue(replies::welcome(&self.branding))),
            Intent::ShowPayPrompt | Intent::ShowAmountPrompt | Intent::ShowDurationPrompt => {
                Ok(UssdReply::Continue(replies::ENTER_PLATE.to_string()))
            }
            Intent::ShowTerms => Ok(UssdReply::End(self.branding.terms.clone())),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate), pay_to } => {
                let pay_phone = pay_to.as_deref().unwrap_or(&input.phone);
                self.initiate_payment(&plate, pay_phone, now)
                    .await
                    .map(|outcome| UssdReply::End(self.payment_text(&outcome)))
            }
            Intent::InitiatePayment { target: PaymentTarget::Choice(choice), .. } => {
                Err(ParkingError::MalformedInput(format!("keypad choice {choice} on ussd")))
            }
            Intent::ComputeAmount { plate, operator } => self
                .amount_due(&plate, operator, &input.phone, now)
                .await
                .map(|due| UssdReply::End(self.amount_text(&plate, due))),
            Intent::ComputeDuration { plate } => self
                .time_stayed(&plate, &input.phone, now)
                .await
                .map(|minutes| UssdReply::End(replies::stayed_for(minutes))),
            Intent::Invalid => {
                debug!(text = %input.raw_text, phone = %input.phone, "ussd_unrecognized");
                self.metrics.record_invalid_input();
                Ok(UssdReply::End(replies::INVALID_CODE.to_string()))
            }
        };

        result.unwrap_or_else(|err| {
            self.note_error(Channel::Ussd, &err);
            UssdReply::End(replies::error_text(&self.branding, &err))
        })
    }

    /// Handle one WhatsApp command. Replies go out through the notifier.
    ///
    /// Unrecognized messages are dropped without a reply.
    pub async fn handle_whatsapp(&self, input: &SessionInput, now: NaiveDateTime) {
        self.metrics.record_request(Channel::WhatsApp);
        let intent = self.router.resolve(Channel::WhatsApp, &input.raw_text);
        debug!(text = %input.raw_text, phone = %input.phone, intent = %intent.as_str(), "whatsapp_message");

        let reply = match intent {
            Intent::ComputeDuration { plate } => self
                .time_stayed(&plate, &input.phone, now)
                .await
                .map(replies::whatsapp_stayed_for),
            Intent::ComputeAmount { plate, operator } => self
                .amount_due(&plate, operator, &input.phone, now)
                .await
                .map(|due| self.amount_text(&plate, due)),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate), pay_to } => {
                let pay_phone = pay_to.unwrap_or_else(|| input.phone.clone());
                match self.initiate_payment(&plate, &pay_phone, now).await {
                    Ok(PaymentOutcome::PromptSent) => {
                        let prompt = PaymentPrompt {
                            amount: self.template_amount,
                            pay_phone,
                            plate,
                        };
                        let sent = self.notifier.send_payment_prompt(&input.phone, &prompt).await;
                        self.acknowledge_send(BestEffort::from_result("whatsapp_template", sent));
                        return;
                    }
                    other => other.map(|outcome| self.payment_text(&outcome)),
                }
            }
            _ => {
                debug!(text = %input.raw_text, phone = %input.phone, "whatsapp_unrecognized");
                self.metrics.record_invalid_input();
                return;
            }
        };

        let text = reply.unwrap_or_else(|err| {
            self.note_error(Channel::WhatsApp, &err);
            replies::error_text(&self.branding, &err)
        });
        let sent = self.notifier.send_text(&input.phone, &text).await;
        self.acknowledge_send(BestEffort::from_result("whatsapp_text", sent));
    }

    fn acknowledge_send(&self, outcome: BestEffort) {
        if outcome.acknowledge() {
            self.metrics.record_best_effort_failure();
        }
    }

    /// Handle one IVR turn.
    ///
    /// Both turns enumerate the caller's vehicles the same way, so a digit
    /// pressed on the second turn selects what the first turn announced.
    pub async fn handle_ivr(&self, input: &SessionInput, now: NaiveDateTime) -> IvrReply {
        self.metrics.record_request(Channel::Ivr);
        let intent = self.router.resolve(Channel::Ivr, &input.raw_text);
        debug!(digits = %input.raw_text, phone = %input.phone, intent = %intent.as_str(), "ivr_turn");

        if !matches!(
            intent,
            Intent::ShowPayPrompt | Intent::InitiatePayment { target: PaymentTarget::Choice(_), .. }
        ) {
            debug!(digits = %input.raw_text, phone = %input.phone, "ivr_invalid_input");
            self.metrics.record_invalid_input();
            return IvrReply::Hangup(replies::IVR_INVALID_INPUT.to_string());
        }

        let vehicles = match self.operator_a.linked_vehicles(&input.phone, self.ivr_max_vehicles).await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                let err = ParkingError::upstream("operator_a_store", e);
                self.note_error(Channel::Ivr, &err);
                return IvrReply::Hangup(replies::error_text(&self.branding, &err));
            }
        };

        match intent {
            Intent::ShowPayPrompt if vehicles.is_empty() => {
                IvrReply::Hangup(replies::IVR_NO_VEHICLES.to_string())
            }
            Intent::ShowPayPrompt => {
                let mut prompts = vec![replies::ivr_welcome(&self.branding)];
                prompts.extend(
                    vehicles.iter().enumerate().map(|(i, plate)| replies::ivr_option(plate, i + 1)),
                );
                IvrReply::Menu { prompts }
            }
            Intent::InitiatePayment { target: PaymentTarget::Choice(choice), .. } => {
                let Some(plate) = (choice as usize).checked_sub(1).and_then(|i| vehicles.get(i))
                else {
                    debug!(choice = %choice, listed = %vehicles.len(), "ivr_invalid_selection");
                    self.metrics.record_invalid_input();
                    return IvrReply::Hangup(replies::IVR_INVALID_SELECTION.to_string());
                };
                match self.initiate_payment(plate, &input.phone, now).await {
                    Ok(PaymentOutcome::PromptSent) => IvrReply::Hangup(replies::ivr_payment_sent(plate)),
                    Ok(PaymentOutcome::WithinFreePeriod { .. }) => {
                        IvrReply::Hangup(replies::IVR_FREE_TIME.to_string())
                    }
                    Err(err) => {
                        self.note_error(Channel::Ivr, &err);
                        IvrReply::Hangup(replies::error_text(&self.branding, &err))
                    }
                }
            }
            _ => IvrReply::Hangup(replies::IVR_INVALID_INPUT.to_string()),
        }
    }
}
