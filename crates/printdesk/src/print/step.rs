//! The portal's submission protocol as explicit steps.

use std::fmt;
use std::path::PathBuf;

use crate::pricing::{PageSelection, PrintDescriptor};
use crate::task::PaperSize;

/// One timeout-bounded action against the portal's single-document form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintStep {
    /// Load the form and wait until it can be submitted.
    OpenForm,
    /// `true` for color, `false` for monochrome.
    SelectColor(bool),
    /// Tick two-sided printing and pick the binding.
    EnableDuplex,
    SelectPaperSize(PaperSize),
    SetCopies(u32),
    SelectPages(PageSelection),
    /// Absolute path of the PDF to upload.
    AttachDocument(PathBuf),
    Submit,
    /// Wait for the page that acknowledges the submission.
    AwaitConfirmation,
    /// Wait until the way back to the form is usable.
    AwaitReturn,
    ReturnToForm,
}

impl PrintStep {
    pub fn name(&self) -> &'static str {
        match self {
            PrintStep::OpenForm => "open_form",
            PrintStep::SelectColor(_) => "select_color",
            PrintStep::EnableDuplex => "enable_duplex",
            PrintStep::SelectPaperSize(_) => "select_paper_size",
            PrintStep::SetCopies(_) => "set_copies",
            PrintStep::SelectPages(_) => "select_pages",
            PrintStep::AttachDocument(_) => "attach_document",
            PrintStep::Submit => "submit",
            PrintStep::AwaitConfirmation => "await_confirmation",
            PrintStep::AwaitReturn => "await_return",
            PrintStep::ReturnToForm => "return_to_form",
        }
    }

    /// Steps that submit `task`, up to and including the return affordance
    /// becoming available.
    pub fn sequence_for(task: &PrintDescriptor) -> Vec<PrintStep> {
        let mut steps = vec![PrintStep::OpenForm, PrintStep::SelectColor(task.is_color)];
        if task.is_duplex {
            steps.push(PrintStep::EnableDuplex);
        }
        steps.extend([
            PrintStep::SelectPaperSize(task.paper_size),
            PrintStep::SetCopies(task.copies),
            PrintStep::SelectPages(task.selection),
            PrintStep::AttachDocument(task.pdf_path.clone()),
            PrintStep::Submit,
            PrintStep::AwaitConfirmation,
            PrintStep::AwaitReturn,
        ]);
        steps
    }
}

impl fmt::Display for PrintStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
