use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StarterPrompt {
    pub question: &'static str,
    pub description: &'static str,
}

/// Questions offered to the operator before the first message.
pub const STARTER_PROMPTS: &[StarterPrompt] = &[
    StarterPrompt {
        question: "How do I create an EKS cluster?",
        description: "Get a step-by-step guide to create and configure an EKS cluster",
    },
    StarterPrompt {
        question: "Common kubectl commands for EKS",
        description: "Get the most useful kubectl commands for managing EKS clusters",
    },
    StarterPrompt {
        question: "Show me my EKS clusters",
        description: "List all available EKS clusters in my AWS account",
    },
    StarterPrompt {
        question: "How do I scale my EKS deployment?",
        description: "Learn how to scale your applications running on EKS",
    },
    StarterPrompt {
        question: "How to connect RDS to my EKS cluster?",
        description: "Steps to integrate your EKS cluster with AWS RDS",
    },
];
