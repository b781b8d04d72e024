use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `benjamin` - personal automation core: approvals, rules, breakers and policy.
#[derive(Parser, Debug)]
#[command(name = "benjamin")]
#[command(version)]
#[command(about = "Approval-gated automation with rules, breakers and scope policy.", long_about = None)]
pub struct Cli {
    /// Override the state directory (default: ~/.benjamin/state)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show policy, safe mode, breakers, approvals and rules at a glance
    Status,

    /// Manage pending approvals
    Approvals {
        #[command(subcommand)]
        approval_command: ApprovalCommands,
    },

    /// Manage and evaluate rules
    Rules {
        #[command(subcommand)]
        rule_command: RuleCommands,
    },

    /// Inspect or reset circuit breakers
    Breakers {
        #[command(subcommand)]
        breaker_command: BreakerCommands,
    },

    /// Inspect or override scope policy
    Policy {
        #[command(subcommand)]
        policy_command: PolicyCommands,
    },

    /// Toggle safe mode
    SafeMode {
        #[command(subcommand)]
        safe_mode_command: SafeModeCommands,
    },

    /// Inspect the execution ledger
    Ledger {
        #[command(subcommand)]
        ledger_command: LedgerCommands,
    },

    /// Show recent audit entries
    Audit {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only entries of this kind (approval, rule, policy, infra)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Run the rule and cleanup loop until interrupted
    Daemon,
}

/// Approval subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCommands {
    /// List approvals, newest first
    List {
        /// Filter by status (pending, approved, rejected, expired)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one approval as JSON
    Show {
        id: String,
    },
    /// Ask to run a write skill; creates a pending approval when allowed
    Request {
        /// Skill name, e.g. reminders.create
        skill: String,
        /// Skill arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// What the step is for
        #[arg(long, default_value = "")]
        goal: String,
    },
    /// Approve and execute a pending approval
    Approve {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Reject a pending approval
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Expire pending approvals past their TTL
    Cleanup,
}

/// Rule subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RuleCommands {
    /// List rules, newest first
    List,
    /// Show one rule as JSON
    Show {
        id: String,
    },
    /// Create a rule
    Add {
        /// Rule name
        name: String,
        /// Trigger type (schedule, gmail, calendar)
        #[arg(long, default_value = "schedule")]
        trigger: String,
        /// Minutes between evaluations
        #[arg(long, default_value_t = 5)]
        every_minutes: u32,
        /// Connector search query
        #[arg(long)]
        query: Option<String>,
        /// Only match items containing this text (case-insensitive)
        #[arg(long)]
        contains: Option<String>,
        /// Skip items containing this text (case-insensitive)
        #[arg(long)]
        not_contains: Option<String>,
        /// Add a notify action with this title
        #[arg(long)]
        notify_title: Option<String>,
        /// Body template for the notify action ({{count}}, {{top1}}, {{top2}}, {{now_iso}})
        #[arg(long, default_value = "{{count}} new match(es): {{top1}}")]
        notify_template: String,
        /// Add a propose-step action for this write skill
        #[arg(long)]
        propose_skill: Option<String>,
        /// Arguments for the proposed step as a JSON object
        #[arg(long, default_value = "{}")]
        propose_args: String,
        /// Rationale shown on the resulting approval
        #[arg(long, default_value = "Proposed by rule")]
        rationale: String,
        /// Minutes to wait after a run that executed actions
        #[arg(long, default_value_t = 0)]
        cooldown_minutes: u32,
        /// Maximum actions executed per run
        #[arg(long, default_value_t = 3)]
        max_actions: usize,
        /// Create the rule disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Enable a rule
    Enable {
        id: String,
    },
    /// Disable a rule
    Disable {
        id: String,
    },
    /// Delete a rule
    Remove {
        id: String,
    },
    /// Evaluate one rule now, or every enabled rule
    Run {
        id: Option<String>,
    },
    /// Dry-run a rule without side effects
    Preview {
        id: String,
    },
    /// Clear a rule's cursor, seen ids and cooldown
    Reset {
        id: String,
    },
}

/// Circuit breaker subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BreakerCommands {
    /// Show every breaker
    Status,
    /// Force a breaker closed
    Reset {
        service: String,
    },
}

/// Policy subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PolicyCommands {
    /// Show the effective policy
    Show,
    /// Enable scopes through the override file
    Enable {
        #[arg(required = true)]
        scopes: Vec<String>,
    },
    /// Disable scopes through the override file
    Disable {
        #[arg(required = true)]
        scopes: Vec<String>,
    },
    /// Replace the scopes rules may propose autonomously
    RulesAllow {
        scopes: Vec<String>,
    },
    /// List known scopes and the default scopes of each skill
    Scopes,
}

/// Safe mode subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SafeModeCommands {
    On,
    Off,
    Status,
}

/// Ledger subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LedgerCommands {
    /// Most recent records, newest last
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
