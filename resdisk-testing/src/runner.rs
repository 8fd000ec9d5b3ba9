// SPDX-License-Identifier: GPL-3.0-only

//! A [`CommandRunner`] that answers from a script and records every call

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use resdisk_sys::{CommandOutput, CommandRunner, ResourceDiskError, Result, ToolCommand};

/// Successful exit with the given stdout
pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Failed exit with the given stderr
pub fn exit(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Missing,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    queued: VecDeque<Reply>,
    always: Option<Reply>,
}

/// Commands are matched by prefix against their rendering, with or without
/// the `umask ... &&` part. The longest matching prefix that still has a
/// reply answers; its queued replies go first, in the order they were added.
/// Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching command with `output`
    pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.rule(prefix).always = Some(Reply::Output(output));
        self
    }

    /// Answer the next matching command with `output`
    pub fn once(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.rule(prefix).queued.push_back(Reply::Output(output));
        self
    }

    /// Matching commands fail to spawn, as if the tool were not installed
    pub fn missing(&self, prefix: &str) -> &Self {
        self.rule(prefix).always = Some(Reply::Missing);
        self
    }

    /// Every rendered command, in call order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| strip_umask(call).starts_with(prefix) || call.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.matching(prefix).len()
    }

    fn rule(&self, prefix: &str) -> RuleGuard<'_> {
        let mut rules = lock(&self.rules);
        let index = match rules.iter().position(|rule| rule.prefix == prefix) {
            Some(index) => index,
            None => {
                rules.push(Rule {
                    prefix: prefix.to_string(),
                    queued: VecDeque::new(),
                    always: None,
                });
                rules.len() - 1
            }
        };
        RuleGuard { rules, index }
    }

    fn reply(&self, rendered: &str) -> Option<Reply> {
        let plain = strip_umask(rendered);
        let mut rules = lock(&self.rules);

        let mut best: Option<usize> = None;
        for (index, rule) in rules.iter().enumerate() {
            let matches = plain.starts_with(&rule.prefix) || rendered.starts_with(&rule.prefix);
            if !matches || (rule.queued.is_empty() && rule.always.is_none()) {
                continue;
            }
            if best.is_none_or(|best| rules[best].prefix.len() < rule.prefix.len()) {
                best = Some(index);
            }
        }

        let rule = &mut rules[best?];
        rule.queued.pop_front().or_else(|| rule.always.clone())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run_capture(&self, command: &ToolCommand) -> Result<CommandOutput> {
        let rendered = command.render();
        lock(&self.calls).push(rendered.clone());

        match self.reply(&rendered) {
            None => Ok(ok("")),
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Missing) => Err(ResourceDiskError::Spawn {
                command: rendered,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

struct RuleGuard<'a> {
    rules: MutexGuard<'a, Vec<Rule>>,
    index: usize,
}

impl std::ops::Deref for RuleGuard<'_> {
    type Target = Rule;

    fn deref(&self) -> &Rule {
        &self.rules[self.index]
    }
}

impl std::ops::DerefMut for RuleGuard<'_> {
    fn deref_mut(&mut self) -> &mut Rule {
        &mut self.rules[self.index]
    }
}

fn strip_umask(rendered: &str) -> &str {
    match rendered.split_once(" && ") {
        Some((head, tail)) if head.starts_with("umask ") => tail,
        _ => rendered,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
