use std::io::{BufRead, Write};

use boxbreath_core::integrations::send_turn;
use boxbreath_core::plan::{apply_plan, extract_plan, FALLBACK_MESSAGE, SUMMARY_FALLBACK_MESSAGE};
use boxbreath_core::{
    summarize_plan, ChatClient, Config, ConfigClient, Conversation, CoreError, Plan,
};
use clap::Args;

use super::{chat_client, config_client, runtime};

/// Typed in an interactive chat to ask for a plan from the conversation so far.
const PLAN_COMMAND: &str = "/plan";

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Message to send; omit to chat interactively
    message: Vec<String>,
    /// Print the proposed plan without storing it
    #[arg(long)]
    no_apply: bool,
    /// After the reply, summarize the conversation into a plan
    #[arg(long, requires = "message")]
    plan: bool,
}

struct ChatSession {
    chat: ChatClient,
    patterns: ConfigClient,
    conversation: Conversation,
    apply: bool,
}

impl ChatSession {
    /// Send one user turn. Returns `true` once a plan has been applied.
    async fn turn(&mut self, text: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let reply = send_turn(&self.chat, &mut self.conversation, text).await?;
        println!("{}", reply.reply);

        let plan = match extract_plan(&reply.reply) {
            Ok(Some(plan)) => plan,
            Ok(None) => return Ok(false),
            Err(e @ CoreError::PlanParseFailed(_)) => {
                tracing::warn!(error = %e, "falling back to calm plan");
                println!("{FALLBACK_MESSAGE}");
                Plan::default_calm()
            }
            Err(e) => return Err(e.into()),
        };

        self.present(&plan).await?;
        Ok(true)
    }

    /// Ask the backend to pick a plan from the transcript and apply it.
    async fn summarize(&self) -> Result<(), Box<dyn std::error::Error>> {
        let summary = summarize_plan(&self.chat, &self.conversation).await?;
        for line in &summary.conversation {
            println!("{line}");
        }
        if summary.fallback {
            println!("{SUMMARY_FALLBACK_MESSAGE}");
        }
        self.present(&summary.plan).await
    }

    async fn present(&self, plan: &Plan) -> Result<(), Box<dyn std::error::Error>> {
        for line in plan.confirmation() {
            println!("{line}");
        }
        if !plan.quote.trim().is_empty() {
            println!("\"{}\"", plan.quote.trim());
        }
        if self.apply {
            let remote = apply_plan(&self.patterns, plan).await?;
            println!("stored pattern: {}", remote.active_pattern().cycle_label());
        }
        Ok(())
    }
}

pub fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut session = ChatSession {
        chat: chat_client(&config)?,
        patterns: config_client(&config)?,
        conversation: Conversation::new(),
        apply: !args.no_apply,
    };
    let rt = runtime()?;

    if !args.message.is_empty() {
        let text = args.message.join(" ");
        let applied = rt.block_on(session.turn(&text))?;
        if args.plan && !applied {
            rt.block_on(session.summarize())?;
        }
        return Ok(());
    }

    if let Some(greeting) = session.conversation.last_reply() {
        println!("{greeting}");
    }
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == PLAN_COMMAND {
            rt.block_on(session.summarize())?;
            break;
        }
        if rt.block_on(session.turn(text))? {
            break;
        }
    }
    Ok(())
}
