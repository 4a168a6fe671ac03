pub mod webhook_jobs;
