pub mod deadline_scan;
