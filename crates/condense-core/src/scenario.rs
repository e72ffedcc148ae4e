//! Built-in scripted dialogs
//!
//! A [`Scenario`] is replayed twice by
//! [`Session::run_comparison_scenario`](crate::session::Session::run_comparison_scenario):
//! once with compaction disabled and once with the scenario's own thresholds.
//! Assistant replies are scripted, so both runs see identical turns and the
//! only difference in prompt size comes from compaction.

use serde::{Deserialize, Serialize};

use crate::compaction::PolicyKind;

/// A scripted conversation and the thresholds it is replayed with
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub id: &'static str,
    pub title: &'static str,
    pub policy: PolicyKind,
    pub summary_interval: usize,
    pub raw_history_limit: usize,
    pub max_summaries: usize,
    /// `(user, assistant)` pairs, in order
    pub exchanges: &'static [(&'static str, &'static str)],
}

impl Scenario {
    pub fn user_turns(&self) -> usize {
        self.exchanges.len()
    }
}

/// One replay of a scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub compaction_enabled: bool,
    pub user_turns: usize,
    /// Estimated prompt tokens of every reply request, in order. `None` when
    /// no estimate could be made for that request.
    pub prompt_tokens_per_turn: Vec<Option<u32>>,
    /// Sum over the requests that have an estimate
    pub total_prompt_tokens: u32,
    pub summaries_generated: usize,
    /// Compaction passes that failed and were skipped
    pub failed_passes: usize,
}

impl ScenarioRun {
    pub fn new(compaction_enabled: bool) -> Self {
        Self {
            compaction_enabled,
            ..Default::default()
        }
    }

    pub fn record_turn(&mut self, prompt_tokens: Option<u32>) {
        self.user_turns += 1;
        self.prompt_tokens_per_turn.push(prompt_tokens);
        if let Some(tokens) = prompt_tokens {
            self.total_prompt_tokens = self.total_prompt_tokens.saturating_add(tokens);
        }
    }

    /// Requests whose prompt size is unknown
    pub fn unestimated_turns(&self) -> usize {
        self.prompt_tokens_per_turn.iter().filter(|t| t.is_none()).count()
    }
}

/// Result of a with/without compaction comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub scenario: String,
    pub policy: PolicyKind,
    pub with_compression: ScenarioRun,
    pub without_compression: ScenarioRun,
    /// `max(0, without - with)` over total prompt tokens
    pub tokens_saved: u32,
    pub summaries_generated: usize,
    pub narrative_text: String,
}

impl ComparisonReport {
    pub fn new(
        scenario: &Scenario,
        with_compression: ScenarioRun,
        without_compression: ScenarioRun,
    ) -> Self {
        let tokens_saved = without_compression
            .total_prompt_tokens
            .saturating_sub(with_compression.total_prompt_tokens);
        let summaries_generated = with_compression.summaries_generated;
        let narrative_text = narrate(scenario, &with_compression, &without_compression, tokens_saved);

        Self {
            scenario: scenario.id.to_string(),
            policy: scenario.policy,
            with_compression,
            without_compression,
            tokens_saved,
            summaries_generated,
            narrative_text,
        }
    }

    /// Share of the uncompressed prompt volume that compaction removed
    pub fn savings_ratio(&self) -> f64 {
        if self.without_compression.total_prompt_tokens == 0 {
            return 0.0;
        }
        f64::from(self.tokens_saved) / f64::from(self.without_compression.total_prompt_tokens)
    }
}

fn narrate(scenario: &Scenario, with: &ScenarioRun, without: &ScenarioRun, saved: u32) -> String {
    let mut text = format!(
        "{}: {} user turns replayed twice. Without compaction the reply requests used {} prompt tokens in total; \
with {} compaction every {} user turns (keeping the last {} raw turns) they used {}.",
        scenario.title,
        with.user_turns,
        without.total_prompt_tokens,
        scenario.policy,
        scenario.summary_interval,
        scenario.raw_history_limit,
        with.total_prompt_tokens,
    );

    if saved > 0 {
        text.push_str(&format!(
            " {} summaries replaced older turns and saved {} tokens.",
            with.summaries_generated, saved
        ));
    } else {
        text.push_str(" Compaction did not reduce the prompt volume for this dialog.");
    }
    let unestimated = with.unestimated_turns() + without.unestimated_turns();
    if unestimated > 0 {
        text.push_str(&format!(
            " {unestimated} requests had no token estimate and are left out of the totals."
        ));
    }
    if with.failed_passes > 0 {
        text.push_str(&format!(
            " {} compaction passes failed and were retried on later turns.",
            with.failed_passes
        ));
    }
    text
}

/// All built-in scenarios
pub fn catalog() -> &'static [Scenario] {
    &CATALOG
}

/// Look up a scenario by id, case-insensitively
pub fn find(id: &str) -> Option<&'static Scenario> {
    let id = id.trim();
    CATALOG.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

static CATALOG: [Scenario; 2] = [SUPPORT_TICKET, TRIP_PLANNING];

const SUPPORT_TICKET: Scenario = Scenario {
    id: "support-ticket",
    title: "Support ticket",
    policy: PolicyKind::Independent,
    summary_interval: 2,
    raw_history_limit: 2,
    max_summaries: 3,
    exchanges: &[
        (
            "Hi, my home router keeps dropping the connection every evening around eight. \
It started last Tuesday after the firmware update. The lights on the front stay green \
but every device in the house loses internet for about ten minutes.",
            "Thanks for the detailed report. Evening drops right after a firmware update usually \
point to the new power saving schedule or to channel congestion when the neighbours come home. \
Let us start with the basics: please open the admin page, go to Wireless settings and tell me \
which channel and band the router is using. Also check whether the Green mode toggle under \
Advanced is switched on, because the update enabled it by default on several models.",
        ),
        (
            "The router is on channel 6 in the 2.4 GHz band and Green mode was switched on. \
I turned it off just now. The model on the sticker is AX3000 and the account is registered \
under my wife's name, if that matters for the warranty.",
            "Good, that helps a lot. Switching off Green mode removes the scheduled radio sleep, \
so tonight should already behave better. Channel 6 is the most crowded one, so I also suggest \
enabling automatic channel selection and turning on the 5 GHz band for laptops and phones. \
The warranty follows the device serial number rather than the account holder, so the name on \
the account does not matter. Let me know how the evening goes and we will continue from there.",
        ),
        (
            "Last night the connection dropped again at ten past eight, although it came back \
after two minutes instead of ten. Automatic channel selection moved it to channel 11. \
The 5 GHz band shows up on my laptop but the smart TV cannot see it at all.",
            "That is real progress: a two minute drop instead of ten suggests the power schedule \
was part of it, and the remaining drop looks like the router itself restarting. Older smart TVs \
often support only 2.4 GHz, so keep that band enabled for the TV. Please open the System log \
page and look for entries around eight in the evening that mention watchdog or reboot. If you \
see them, the unit is restarting and we will likely replace it under warranty.",
        ),
        (
            "The log shows a watchdog reboot at 20:10 and another one at 20:11 yesterday, \
and the same pattern on the three previous evenings. Nothing else is running at that time \
as far as I know, the kids are usually streaming video.",
            "Thank you, those watchdog entries confirm a hardware fault under load, which matches \
the evening streaming peak. Since the device is covered, I have opened replacement request \
RMA-48213 for the AX3000. A new unit will be shipped with express delivery, and you can keep \
using the current one until it arrives. When the replacement comes, restore your settings \
from a backup file so that the channel and band choices we made carry over.",
        ),
        (
            "Great, thank you. Can you confirm the delivery address is the one on the account, \
and do I need to send the old router back in the same box? I would also like to know how to \
create the settings backup you mentioned before the new unit arrives.",
            "Yes, the replacement goes to the address on the account, and a prepaid return label \
will be inside the box, so please send the old router back in the same packaging within \
fourteen days. To create the backup, open System, then Backup and restore, and choose Save \
configuration; keep the file on your laptop. After plugging in the new unit, use Restore with \
that file and all wireless settings, including the automatic channel and 5 GHz band, come back.",
        ),
    ],
};

const TRIP_PLANNING: Scenario = Scenario {
    id: "trip-planning",
    title: "Trip planning",
    policy: PolicyKind::Cumulative,
    summary_interval: 3,
    raw_history_limit: 4,
    max_summaries: 3,
    exchanges: &[
        (
            "We want to plan a ten day trip to Portugal in late May for two adults.",
            "Late May is a great time: warm but not crowded. Do you prefer cities, coast, or a mix of both?",
        ),
        (
            "A mix. Our budget is about 3000 euros excluding flights.",
            "That budget works well. A common split is four nights in Lisbon, three in Porto and three on the coast.",
        ),
        (
            "We prefer trains over renting a car.",
            "Then Lisbon, Porto and Lagos are all reachable by train or a short bus ride. Lagos needs one change in Tunes.",
        ),
        (
            "Which neighbourhood should we stay in for Lisbon?",
            "Baixa and Chiado are central and flat enough for walking; Alfama is charming but hilly.",
        ),
        (
            "We decided on Chiado. What are must-see places?",
            "Belem tower, the Jeronimos monastery, the Alfama viewpoints and a day trip to Sintra.",
        ),
        (
            "How do we get to Sintra?",
            "Take the train from Rossio station. It takes about forty minutes and runs every twenty minutes.",
        ),
        (
            "For Porto, is three nights enough?",
            "Three nights is enough for Ribeira, the port cellars in Gaia and a Douro valley day trip.",
        ),
        (
            "We need a hotel in Porto with a river view.",
            "Look in Ribeira or on the Gaia side; book early because river view rooms sell out in May.",
        ),
        (
            "Booked a hotel in Gaia. What about the coast part?",
            "Lagos has the best beaches and boat trips to the Ponta da Piedade grottoes.",
        ),
        (
            "Is the water warm enough to swim in May?",
            "It is cool, around eighteen degrees, but fine for a quick swim on a sunny afternoon.",
        ),
        (
            "Can you recap the itinerary for us?",
            "Four nights in Chiado, Lisbon with a Sintra day trip, three nights in Gaia, Porto, and three nights in Lagos, all by train.",
        ),
        (
            "Thanks. Anything we should book in advance?",
            "Book the Porto to Lisbon and Lisbon to Lagos trains, the Douro day trip and the Sintra palace tickets.",
        ),
    ],
};
