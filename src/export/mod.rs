mod xlsx;

pub use xlsx::{collect_sheets, render_workbook, write_job_workbook, ExportError, Sheet};
